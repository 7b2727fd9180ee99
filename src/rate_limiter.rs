//! Persisted rate limiting for the sensitive endpoints.
//!
//! One atomic upsert per request against a counter keyed by
//! `(endpoint, caller IP)`: Redis INCR + EXPIRE when a backend is configured,
//! a dashmap entry otherwise. Callers choose the outage behavior per
//! endpoint: payment and notification endpoints fail closed (deny while the
//! backend is unreachable), informational endpoints fall back to the
//! in-process store.

use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
enum RateLimitBackend {
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

/// Decision returned for every checked request.
#[derive(Debug)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub current: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    backend: RateLimitBackend,
    // Shared by the in-memory mode and the fail-open fallback path.
    local: Arc<DashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn in_memory() -> Self {
        Self {
            backend: RateLimitBackend::InMemory,
            local: Arc::new(DashMap::new()),
        }
    }

    pub fn redis(client: Arc<redis::Client>, namespace: impl Into<String>) -> Self {
        Self {
            backend: RateLimitBackend::Redis {
                client,
                namespace: namespace.into(),
            },
            local: Arc::new(DashMap::new()),
        }
    }

    /// Count this request against `(endpoint, ip)` and decide whether it may
    /// proceed. The counter window resets when it has fully elapsed.
    pub async fn check_and_increment(
        &self,
        ip: &str,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
        fail_closed: bool,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let key = format!("{}:{}", endpoint, ip);
        match &self.backend {
            RateLimitBackend::InMemory => Ok(self.check_local(&key, max_requests, window)),
            RateLimitBackend::Redis { client, namespace } => {
                let redis_key = format!("{}:{}", namespace, key);
                match Self::check_with_redis(client, &redis_key, max_requests, window).await {
                    Ok(decision) => Ok(decision),
                    Err(err) if fail_closed => {
                        warn!(%err, endpoint, "rate limit backend unreachable, denying (fail-closed)");
                        Err(RateLimitError::BackendUnavailable(err.to_string()))
                    }
                    Err(err) => {
                        warn!(%err, endpoint, "rate limit backend unreachable, using local fallback");
                        Ok(self.check_local(&key, max_requests, window))
                    }
                }
            }
        }
    }

    fn check_local(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        let mut entry = self
            .local
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                window_start: Instant::now(),
            });

        let now = Instant::now();
        if now.duration_since(entry.window_start) >= window {
            entry.count = 1;
            entry.window_start = now;
        } else {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed: entry.count <= max_requests,
            remaining: max_requests.saturating_sub(entry.count),
            current: entry.count,
        }
    }

    async fn check_with_redis(
        client: &redis::Client,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, redis::RedisError> {
        let mut conn = client.get_async_connection().await?;
        let window_secs = window.as_secs().max(1) as usize;

        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(key, window_secs).await;
        } else {
            // Repair a missing TTL so a stuck counter cannot deny forever.
            let ttl: i64 = conn.ttl(key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(key, window_secs).await;
            }
        }

        let allowed = count <= max_requests as i64;
        Ok(RateLimitDecision {
            allowed,
            remaining: if allowed {
                max_requests.saturating_sub(count.max(0) as u32)
            } else {
                0
            },
            current: count.max(0) as u32,
        })
    }
}

/// Resolve the caller IP: first hop of a forwarded-for chain, then the
/// platform client-ip header, then a shared "unknown" bucket (coarser, but
/// still limited).
pub fn extract_client_ip(headers: &http::HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            if !ip_str.trim().is_empty() {
                return ip_str.trim().to_string();
            }
        }
    }

    "unknown".to_string()
}
