//! Per-client rate limiting with fixed windows.
//!
//! Each (client IP, tier) pair gets a request budget that refills when its
//! window elapses. Auth endpoints use a smaller budget than the rest of the
//! API to slow down password guessing.

use axum::{
    body::Body,
    extract::State,
    http::{header::RETRY_AFTER, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

use super::error::{ApiError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Authenticated API endpoints
    Api,
    /// Register and login
    Auth,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    used: u32,
    window_start: Instant,
}

/// Outcome of an allowed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<(IpAddr, RateLimitTier), WindowEntry>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    pub fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Count a request against the client's budget.
    /// Returns `Err(retry_after_seconds)` once the budget is spent.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        self.check_at(ip, tier, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, tier: RateLimitTier, now: Instant) -> Result<RateLimitInfo, u64> {
        let limit = self.limit_for(tier);
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                limit,
                remaining: limit,
                reset_after: 0,
            });
        }

        let mut entry = self.entries.entry((ip, tier)).or_insert_with(|| WindowEntry {
            used: 0,
            window_start: now,
        });

        let mut elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.used = 0;
            entry.window_start = now;
            elapsed = Duration::ZERO;
        }
        let reset_after = self.window.saturating_sub(elapsed).as_secs().max(1);

        if entry.used >= limit {
            return Err(reset_after);
        }

        entry.used += 1;
        Ok(RateLimitInfo {
            limit,
            remaining: limit - entry.used,
            reset_after,
        })
    }

    /// Drop entries whose window ended more than one window ago
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < expiry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Client address from proxy headers, falling back to loopback
fn client_ip(request: &Request<Body>) -> IpAddr {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    forwarded
        .into_iter()
        .chain(real_ip)
        .find_map(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(&state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(&state, request, next, RateLimitTier::Auth).await
}

async fn limit_tier(
    state: &AppState,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = client_ip(&request);

    match state.rate_limiter.check(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(info.limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(info.remaining));
            headers.insert("x-ratelimit-reset", HeaderValue::from(info.reset_after));
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %ip, tier = ?tier, "Rate limit exceeded");
            let mut response = ApiError::new(
                ErrorCode::TooManyRequests,
                format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
            )
            .into_response();
            let headers = response.headers_mut();
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
            headers.insert(
                "x-ratelimit-limit",
                HeaderValue::from(state.rate_limiter.limit_for(tier)),
            );
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            response
        }
    }
}

/// Periodically evict stale rate limit entries
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                entries = rate_limiter.entry_count(),
                "Rate limiter cleanup complete"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            api_requests_per_window: 10,
            auth_requests_per_window: 3,
            window_seconds: 60,
            cleanup_interval: 300,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_blocks_after_budget_is_spent() {
        let limiter = RateLimiter::new(test_config());
        let client = ip("10.0.0.1");

        for i in 0..10 {
            let info = limiter.check(client, RateLimitTier::Api).unwrap();
            assert_eq!(info.remaining, 9 - i);
        }

        let retry_after = limiter.check(client, RateLimitTier::Api).unwrap_err();
        assert!(retry_after >= 1 && retry_after <= 60);
    }

    #[test]
    fn test_clients_and_tiers_are_counted_separately() {
        let limiter = RateLimiter::new(test_config());
        let client = ip("10.0.0.1");

        for _ in 0..3 {
            limiter.check(client, RateLimitTier::Auth).unwrap();
        }
        assert!(limiter.check(client, RateLimitTier::Auth).is_err());
        assert!(limiter.check(client, RateLimitTier::Api).is_ok());
        assert!(limiter.check(ip("10.0.0.2"), RateLimitTier::Auth).is_ok());
    }

    #[test]
    fn test_window_elapse_refills_budget() {
        let limiter = RateLimiter::new(test_config());
        let client = ip("10.0.0.1");
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at(client, RateLimitTier::Auth, start).unwrap();
        }
        assert!(limiter.check_at(client, RateLimitTier::Auth, start).is_err());

        let later = start + Duration::from_secs(61);
        let info = limiter.check_at(client, RateLimitTier::Auth, later).unwrap();
        assert_eq!(info.remaining, 2);
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = test_config();
        config.enabled = false;
        let limiter = RateLimiter::new(config);

        for _ in 0..100 {
            assert!(limiter.check(ip("10.0.0.1"), RateLimitTier::Auth).is_ok());
        }
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_entries() {
        let limiter = RateLimiter::new(test_config());
        limiter.check(ip("10.0.0.1"), RateLimitTier::Api).unwrap();

        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 1);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), ip("203.0.113.7"));

        let request = Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), ip("198.51.100.2"));

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), ip("127.0.0.1"));
    }
}
