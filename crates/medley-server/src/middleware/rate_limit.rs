//! Governor-based rate limiting for the API.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::json;

use crate::context::AppContext;

/// A shared rate limiter instance.
pub type SharedLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const DEFAULT_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(600) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// Create a rate limiter with the given requests-per-minute quota. Zero
/// falls back to the default.
pub fn create_limiter(requests_per_minute: u32) -> SharedLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(DEFAULT_PER_MINUTE));
    Arc::new(RateLimiter::direct(quota))
}

/// Returns 429 Too Many Requests when the API quota is exhausted.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if ctx.limiter.check().is_err() {
        metrics::counter!("medley_http_rate_limited_total").increment(1);
        return (
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            axum::Json(json!({
                "success": false,
                "error": "Rate limit exceeded",
                "code": "rate_limited",
            })),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_enforces_quota() {
        let limiter = create_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_quota_uses_default() {
        let limiter = create_limiter(0);
        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }
}
