use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::MAX_SESSION_DAYS;
use crate::models::{ApiResponse, Session, User, Viewer};
use crate::store::{Store, StoreError};

pub const SESSION_COOKIE: &str = "session";
pub const DEFAULT_HASH_COST: u32 = 10;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub sid: String, // session id
    pub exp: i64,    // expiration timestamp
    pub iat: i64,    // issued at
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Session expired or revoked")]
    SessionRevoked,
    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AuthService {
    jwt_secret: String,
    session_days: i64,
    hash_cost: u32,
    store: Arc<Store>,
}

impl AuthService {
    pub fn new(jwt_secret: String, store: Arc<Store>) -> Self {
        Self {
            jwt_secret,
            session_days: 7,
            hash_cost: DEFAULT_HASH_COST,
            store,
        }
    }

    /// Lower costs keep tests fast; production uses the default
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn with_session_days(mut self, days: i64) -> Self {
        self.session_days = days.clamp(1, MAX_SESSION_DAYS);
        self
    }

    pub fn session_days(&self) -> i64 {
        self.session_days
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, self.hash_cost)
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    pub fn validate_username(username: &str) -> Result<(), AuthError> {
        let len = username.chars().count();
        if username.trim() != username || !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
            return Err(AuthError::InvalidInput(format!(
                "username must be {}-{} characters without surrounding spaces",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<(), AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }

    /// Create an account. A taken username surfaces as `StoreError::Conflict`.
    pub fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        Self::validate_username(username)?;
        Self::validate_password(password)?;

        let now = Utc::now();
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            password_hash: self.hash_password(password)?,
            bio: String::new(),
            avatar: None,
            dark_mode: false,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&mut user)?;

        log::info!("Registered user {}", user.username);
        Ok(user)
    }

    /// Check credentials and open a session. Returns the user and a token
    /// bound to the new session.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String), AuthError> {
        let user = match self.store.get_user_by_username(username) {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if !self.verify_password(password, &user.password_hash).unwrap_or(false) {
            log::debug!("Failed login for {}", username);
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.start_session(&user.id)?;
        Ok((user, token))
    }

    pub fn start_session(&self, user_id: &str) -> Result<String, AuthError> {
        let mut session = Session {
            id: String::new(),
            user_id: user_id.to_string(),
            expires_at: Utc::now() + Duration::days(self.session_days),
            created_at: Utc::now(),
        };
        self.store.create_session(&mut session)?;
        Ok(self.generate_token(&session)?)
    }

    /// Generate a JWT token for a session
    pub fn generate_token(&self, session: &Session) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: session.user_id.clone(),
            sid: session.id.clone(),
            exp: session.expires_at.timestamp(),
            iat: Utc::now().timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    /// Validate a JWT token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Resolve a token to its user. The session row must still exist, so a
    /// logged-out token stops working before it expires.
    pub fn resolve(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let session = match self.store.get_session(&claims.sid) {
            Ok(session) => session,
            Err(StoreError::NotFound(_)) => return Err(AuthError::SessionRevoked),
            Err(e) => return Err(e.into()),
        };

        if session.user_id != claims.sub || session.expires_at <= Utc::now() {
            return Err(AuthError::SessionRevoked);
        }

        Ok(AuthUser {
            user_id: session.user_id,
            session_id: session.id,
        })
    }

    pub fn end_session(&self, session_id: &str) -> Result<(), AuthError> {
        self.store.delete_session(session_id)?;
        Ok(())
    }
}

pub fn session_cookie(token: &str, days: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(actix_web::cookie::time::Duration::days(days));
    cookie
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

/// Authenticated user info extracted from request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub session_id: String,
}

impl AuthUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::User(self.user_id.clone())
    }
}

/// Token from the session cookie, falling back to a bearer header
fn request_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(String::from)
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AuthRejection> {
    let rejection = |message: &str| AuthRejection {
        api: req.path().starts_with("/api/"),
        message: message.to_string(),
    };

    let auth_service = req
        .app_data::<web::Data<Arc<AuthService>>>()
        .ok_or_else(|| {
            log::error!("AuthService missing from app data");
            rejection("Authentication unavailable")
        })?;

    let token = request_token(req).ok_or_else(|| rejection("Authentication required"))?;
    auth_service.resolve(&token).map_err(|e| {
        log::debug!("Rejected token: {}", e);
        rejection("Invalid or expired session")
    })
}

/// Rejection for routes that need a signed-in user: JSON 401 under `/api/`,
/// a redirect to the login page elsewhere.
#[derive(Debug)]
pub struct AuthRejection {
    api: bool,
    message: String,
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        if self.api {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::SEE_OTHER
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.api {
            HttpResponse::Unauthorized().json(ApiResponse::<()>::error(&self.message))
        } else {
            HttpResponse::SeeOther()
                .insert_header((header::LOCATION, "/login"))
                .json(ApiResponse::<()>::error(&self.message))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = AuthRejection;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// Public routes take a `Viewer`: signed in if the request carries a valid
/// session, anonymous otherwise. Never rejects.
impl FromRequest for Viewer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let viewer = match authenticate(req) {
            Ok(user) => Viewer::User(user.user_id),
            Err(_) => Viewer::Anonymous,
        };
        ready(Ok(viewer))
    }
}
