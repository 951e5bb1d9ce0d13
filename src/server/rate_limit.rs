use crate::config::RateLimitConfig;
use axum::http::HeaderMap;
use dashmap::DashMap;
use std::time::{ Duration, Instant };

const UNKNOWN_CLIENT: &str = "unknown";
const PURGE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
    },
    Limited {
        retry_after: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client.
///
/// Best effort only: state lives in this process and is not shared between instances.
/// Clients that do not send the identifying header all land in one bucket.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window, config.max_requests)
    }

    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired(now);
        }

        let mut entry = self.windows
            .entry(client.to_string())
            .or_insert(Window { started: now, count: 0 });
        let window = entry.value_mut();

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.window {
            *window = Window { started: now, count: 0 };
        }

        if window.count >= self.max_requests {
            let remaining = self.window.saturating_sub(
                now.saturating_duration_since(window.started)
            );
            let retry_after = remaining.as_secs_f64().ceil() as u64;
            return RateDecision::Limited {
                retry_after: retry_after.clamp(1, self.window.as_secs().max(1)),
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - window.count,
        }
    }

    pub fn purge_expired(&self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// First entry of the identifying header (proxies append to `x-forwarded-for`), or the shared
/// "unknown" bucket.
pub fn client_key(headers: &HeaderMap, header_name: &str) -> String {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
