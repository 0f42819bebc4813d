//! Token-bucket rate limiting keyed by client IP and tenant.
//!
//! Buckets refill continuously at `per_minute / 60` tokens per second up to
//! the burst size. The tenant key is sniffed from the JSON body (mutating
//! endpoints) or the query string (reads); requests without one are limited
//! by IP alone.

use crate::error::ApiError;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

/// One token bucket per key.
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Keyed token-bucket limiter.
pub struct TokenLimiter {
    rate_per_second: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenLimiter {
    #[must_use]
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let per_minute = if per_minute == 0 { 60 } else { per_minute };
        let burst = if burst == 0 { 20 } else { burst };
        Self {
            rate_per_second: f64::from(per_minute) / 60.0,
            burst: f64::from(burst),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `key`; `false` means over the limit.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the lock leaves the map usable.
            poisoned.into_inner()
        });

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last: now,
        });
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(self.burst);
        bucket.last = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

/// IP and tenant limiters shared by the whole surface.
pub struct RateLimiter {
    ip: TokenLimiter,
    tenant: TokenLimiter,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &crate::config::RateLimitConfig) -> Self {
        Self {
            ip: TokenLimiter::new(config.ip_per_minute, config.ip_burst),
            tenant: TokenLimiter::new(config.tenant_per_minute, config.tenant_burst),
        }
    }
}

#[derive(Deserialize)]
struct TenantFields {
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Axum middleware enforcing both limits.
pub async fn rate_limit_middleware(
    State(limiter): State<std::sync::Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if let Some(ip) = ip {
        if !limiter.ip.allow(&ip) {
            return ApiError::rate_limited().into_response();
        }
    }

    let (request, tenant_id, request_id) = extract_tenant(request).await;
    if let Some(tenant_id) = tenant_id {
        if !limiter.tenant.allow(&tenant_id) {
            return ApiError::rate_limited()
                .with_request_id(&request_id.unwrap_or_default())
                .into_response();
        }
    }

    next.run(request).await
}

fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Pull the tenant id out of the request without consuming it: the query
/// string for reads, a buffered-and-restored JSON body for writes.
async fn extract_tenant(request: Request) -> (Request, Option<String>, Option<String>) {
    if request.method() != Method::POST && request.method() != Method::PUT {
        let tenant = query_param(&request, "tenant_id");
        return (request, tenant, None);
    }

    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, 1 << 20).await else {
        return (Request::from_parts(parts, Body::empty()), None, None);
    };

    let fields: Option<TenantFields> = serde_json::from_slice(&bytes).ok();
    let request = Request::from_parts(parts, Body::from(bytes));
    match fields {
        Some(fields) => (request, fields.tenant_id, fields.request_id),
        None => (request, None, None),
    }
}

fn query_param(request: &Request, key: &str) -> Option<String> {
    let query = request.uri().query()?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some(key) {
            return parts.next().map(ToString::to_string);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_refill() {
        let limiter = TokenLimiter::new(60, 3);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // A different key has its own bucket.
        assert!(limiter.allow("other"));
    }

    #[test]
    fn refill_restores_tokens() {
        let limiter = TokenLimiter::new(6000, 1); // 100 tokens/second
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn zero_config_falls_back_to_sane_limits() {
        let limiter = TokenLimiter::new(0, 0);
        for _ in 0..20 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));
    }
}
