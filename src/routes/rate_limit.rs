//! Per-client fixed-window rate limiting for the `/ai` routes.
//!
//! Counters live in memory; a restart resets them. Clients are keyed by peer
//! address unless the service is told it sits behind a trusted proxy.
//! Every limited response carries `RateLimit-Limit`, `RateLimit-Remaining`
//! and `RateLimit-Reset`; rejections add `Retry-After`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        header::{HeaderName, RETRY_AFTER},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const RATE_LIMIT_PER_IP: u32 = 100;
const RATE_WINDOW: Duration = Duration::from_secs(15 * 60);
// Hard cap on tracked clients; the oldest window is evicted beyond it.
const MAX_TRACKED_CLIENTS: usize = 10_000;

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

struct Window {
    started: Instant,
    count: u32,
}

/// Result of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the client's window starts over.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Whole seconds until reset, rounded up.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 { secs + 1 } else { secs }
    }

    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT.clone(), HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING.clone(), HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET.clone(), HeaderValue::from(self.reset_secs()));
        if !self.allowed {
            headers.insert(RETRY_AFTER, HeaderValue::from(self.reset_secs()));
        }
    }
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_PER_IP, RATE_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, hits: Mutex::new(HashMap::new()) }
    }

    /// Count one request for `key`. Once the window's budget is spent the
    /// decision is a rejection and the counter stops growing.
    pub fn check(&self, key: &str) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if !hits.contains_key(key) && hits.len() >= MAX_TRACKED_CLIENTS {
            let window = self.window;
            hits.retain(|_, w| now.duration_since(w.started) < window);
            if hits.len() >= MAX_TRACKED_CLIENTS {
                let oldest = hits.iter().min_by_key(|(_, w)| w.started).map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    hits.remove(&oldest);
                }
            }
        }

        let entry = hits.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        let allowed = entry.count < self.limit;
        if allowed {
            entry.count += 1;
        }
        RateDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Client key: the peer address. Behind a trusted proxy, `x-forwarded-for`
/// (first hop) and then `x-real-ip` take precedence.
fn client_key(request: &Request, trust_proxy: bool) -> String {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let forwarded = if trust_proxy {
        header("x-forwarded-for").or_else(|| header("x-real-ip"))
    } else {
        None
    };
    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".into())
}

pub async fn rate_limit_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let key = client_key(&request, state.settings.trust_proxy);
    let decision = state.limiter.check(&key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(target: "algohints_backend", client = %key, reset_secs = decision.reset_secs(), "Rate limit exceeded");
        ApiError::RateLimited.into_response()
    };
    decision.write_headers(response.headers_mut());
    response
}
