use crate::errors::ServiceError;
use crate::rate_limiter::{extract_client_ip, RateLimiter};
use axum::http::HeaderMap;
use tracing::warn;

/// Strips characters with markup significance from user-supplied query
/// values before they reach filter expressions or logs.
pub fn sanitize_query_value(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\''))
        .collect()
}

/// Applies a per-source-IP rate limit.
///
/// Limiter backend failures fail open: a broken Redis must not take the
/// ordering flow down with it.
pub async fn enforce_ip_rate_limit(
    limiter: &RateLimiter,
    headers: &HeaderMap,
) -> Result<(), ServiceError> {
    let ip = extract_client_ip(headers);
    let key = format!("ip:{}", ip);

    match limiter.check_rate_limit(&key).await {
        Ok(result) => {
            if result.allowed {
                Ok(())
            } else {
                warn!(client_ip = %ip, "Rate limit exceeded");
                Err(ServiceError::RateLimitExceeded)
            }
        }
        Err(err) => {
            warn!("Rate limiter error: {}", err);
            Ok(())
        }
    }
}
