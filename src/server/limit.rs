//! Fixed-window request limiter keyed by client IP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::common::config::RateLimitSettings;
use crate::common::AppError;
use crate::server::state::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<IpAddr, Window>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_requests: settings.requests,
            window: Duration::from_secs(settings.window_secs),
        }
    }

    /// Count one request. `Err(retry_after_secs)` once the window is exhausted.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut entry = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let reset_at = entry.started + self.window;
            return Err(reset_at.saturating_duration_since(now).as_secs().max(1));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have already expired.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

/// Middleware for `/api/*`. Requests without peer info (in-process tests)
/// share the unspecified-address bucket.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if let Err(retry_after) = state.limiter.check(ip) {
        tracing::warn!(%ip, retry_after, "Rate limit exceeded");
        return Err(AppError::TooManyRequests(format!(
            "too many requests, retry in {retry_after}s"
        )));
    }

    Ok(next.run(request).await)
}
