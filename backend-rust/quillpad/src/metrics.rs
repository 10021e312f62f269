use actix_web::{dev::{Service, ServiceRequest, ServiceResponse, Transform}, web, Error, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::future::{ok, Ready};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

#[derive(Default)]
struct Counters {
    /// (route pattern, method) -> count
    endpoints: HashMap<(String, String), u64>,
    status_codes: HashMap<u16, u64>,
    total: u64,
}

/// In-memory request counters. Clones share the same counters.
#[derive(Clone)]
pub struct MetricsCollector {
    counters: Arc<Mutex<Counters>>,
    start_time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct EndpointStats {
    pub path: String,
    pub method: String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct StatusCodeBreakdown {
    pub status_code: u16,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub endpoints: Vec<EndpointStats>,
    pub status_codes: Vec<StatusCodeBreakdown>,
    pub total_calls: u64,
    pub started_at: String,
    pub current_uptime_secs: i64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters::default())),
            start_time: Utc::now(),
        }
    }

    /// Count one finished request. `path` should be the route pattern so
    /// ids do not explode the key space.
    pub fn record(&self, path: &str, method: &str, status_code: u16) {
        let mut counters = self.counters.lock().unwrap();
        *counters
            .endpoints
            .entry((path.to_string(), method.to_string()))
            .or_insert(0) += 1;
        *counters.status_codes.entry(status_code).or_insert(0) += 1;
        counters.total += 1;
    }

    pub fn get_metrics(&self) -> MetricsResponse {
        let counters = self.counters.lock().unwrap();

        let mut endpoints: Vec<EndpointStats> = counters
            .endpoints
            .iter()
            .map(|((path, method), count)| EndpointStats {
                path: path.clone(),
                method: method.clone(),
                count: *count,
            })
            .collect();
        endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));

        let total = counters.total.max(1) as f64;
        let mut status_codes: Vec<StatusCodeBreakdown> = counters
            .status_codes
            .iter()
            .map(|(status_code, count)| StatusCodeBreakdown {
                status_code: *status_code,
                count: *count,
                percentage: (*count as f64 / total) * 100.0,
            })
            .collect();
        status_codes.sort_by_key(|s| s.status_code);

        MetricsResponse {
            endpoints,
            status_codes,
            total_calls: counters.total,
            started_at: self.start_time.to_rfc3339(),
            current_uptime_secs: (Utc::now() - self.start_time).num_seconds(),
        }
    }
}

// Middleware implementation
impl<S, B> Transform<S, ServiceRequest> for MetricsCollector
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(MetricsMiddleware {
            service,
            metrics: self.clone(),
        })
    }
}

pub struct MetricsMiddleware<S> {
    service: S,
    metrics: MetricsCollector,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let path = req.match_pattern().unwrap_or_else(|| "unmatched".to_string());
        let method = req.method().to_string();
        let should_track = !path.starts_with("/uploads/");
        let metrics = self.metrics.clone();

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;

            // Record metrics after response, capturing status code
            if should_track {
                metrics.record(&path, &method, res.status().as_u16());
            }

            Ok(res)
        })
    }
}

// API endpoint handlers
pub async fn get_metrics_handler(metrics: web::Data<MetricsCollector>) -> HttpResponse {
    HttpResponse::Ok().json(metrics.get_metrics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::App;

    #[test]
    fn test_record_groups_by_pattern_and_status() {
        let metrics = MetricsCollector::new();
        metrics.record("/post/{id}", "GET", 200);
        metrics.record("/post/{id}", "GET", 404);
        metrics.record("/health", "GET", 200);

        let report = metrics.get_metrics();
        assert_eq!(report.total_calls, 3);
        assert_eq!(report.endpoints[0].path, "/post/{id}");
        assert_eq!(report.endpoints[0].count, 2);
        assert_eq!(report.status_codes[0].status_code, 200);
        assert_eq!(report.status_codes[0].count, 2);
    }

    #[actix_web::test]
    async fn test_middleware_counts_route_patterns() {
        let metrics = MetricsCollector::new();
        let app = init_service(
            App::new()
                .wrap(metrics.clone())
                .route("/post/{id}", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for id in ["a", "b"] {
            let req = TestRequest::get().uri(&format!("/post/{}", id)).to_request();
            call_service(&app, req).await;
        }

        let report = metrics.get_metrics();
        assert_eq!(report.endpoints.len(), 1);
        assert_eq!(report.endpoints[0].path, "/post/{id}");
        assert_eq!(report.endpoints[0].count, 2);
    }
}
