// Library entry point for quillpad
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod config;
pub mod events;
pub mod feed;
pub mod media;
pub mod metrics;
pub mod models;
pub mod store;
