//! Per-client fixed-window admission control

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use http::HeaderMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Request count for one client in its current window
#[derive(Debug, Clone, Copy)]
pub struct ClientRateState {
    pub count: u32,
    pub reset_at: Instant,
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

/// Allows at most `limit` requests per client per `window`.
///
/// Windows are fixed and reset lazily on the first request after expiry, so
/// a client can burst up to twice the limit across a window boundary.
pub struct AdmissionController {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, ClientRateState>>,
}

impl AdmissionController {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn check(&self, key: &str) -> Admission {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock().await;
        match clients.get_mut(key) {
            Some(state) if now <= state.reset_at => {
                if state.count >= self.limit {
                    return Admission {
                        allowed: false,
                        remaining: 0,
                        reset_at: state.reset_at,
                    };
                }
                state.count += 1;
                Admission {
                    allowed: true,
                    remaining: self.limit - state.count,
                    reset_at: state.reset_at,
                }
            }
            _ => {
                let reset_at = now + self.window;
                if self.limit == 0 {
                    return Admission {
                        allowed: false,
                        remaining: 0,
                        reset_at,
                    };
                }
                clients.insert(
                    key.to_string(),
                    ClientRateState { count: 1, reset_at },
                );
                Admission {
                    allowed: true,
                    remaining: self.limit.saturating_sub(1),
                    reset_at,
                }
            }
        }
    }

    /// Drop state for clients whose window has passed.
    pub async fn prune_expired(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, state| state.reset_at >= now);
        before - clients.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Sweep expired clients once per window until `shutdown` fires.
    pub fn spawn_pruner(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.window);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = tokio::time::Instant::now().into_std();
                        let removed = self.prune_expired(now).await;
                        if removed > 0 {
                            debug!("Pruned {} expired rate limit entries", removed);
                        }
                    }
                }
            }
        })
    }
}

/// Identify the client: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    if let Some(real_ip) = header("x-real-ip") {
        return Some(real_ip.to_string());
    }
    peer.map(|addr| addr.ip().to_string())
}
