use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failures tolerated inside a window before lockout kicks in.
    pub max_attempts: u32,
    /// Inactivity window after which an unlocked entry is forgotten.
    pub window: Duration,
    /// Lockout applied at the threshold; doubles per further failure.
    pub base_lockout: Duration,
    pub max_lockout: Duration,
    /// Cadence of the background sweep over both maps.
    pub sweep_interval: StdDuration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            base_lockout: Duration::milliseconds(1000),
            max_lockout: Duration::minutes(15),
            sweep_interval: StdDuration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: StdDuration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

#[derive(Debug, Clone)]
struct AttemptEntry {
    attempts: u32,
    first_attempt: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

/// In-memory login rate limiter with exponential backoff, tracking IP and
/// username axes independently. A login is allowed only when both axes allow
/// it.
///
/// State is process-local; a horizontally scaled deployment would need to move
/// it to a shared store with atomic increment semantics.
pub struct LoginRateLimiter {
    ip_limits: RwLock<HashMap<String, AttemptEntry>>,
    username_limits: RwLock<HashMap<String, AttemptEntry>>,
    config: RateLimitConfig,
}

impl LoginRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            ip_limits: RwLock::new(HashMap::new()),
            username_limits: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check whether a login attempt is allowed for this IP/username pair.
    /// An absent IP leaves the IP axis always-allowed. When both axes are
    /// locked the longer remaining retry time wins.
    pub async fn check(&self, ip: Option<&str>, username: &str) -> RateLimitDecision {
        self.check_at(ip, username, Utc::now()).await
    }

    /// Record a failed login against both axes.
    pub async fn record_failure(&self, ip: Option<&str>, username: &str) {
        self.record_failure_at(ip, username, Utc::now()).await;
    }

    /// Drop both entries for the pair after a successful login. Idempotent.
    pub async fn reset(&self, ip: Option<&str>, username: &str) {
        if let Some(ip) = ip {
            self.ip_limits.write().await.remove(ip);
        }
        self.username_limits
            .write()
            .await
            .remove(&username.to_lowercase());
        debug!(ip, username, "Rate limit reset after successful login");
    }

    /// Remove entries whose window has expired, bounding map growth.
    pub async fn sweep(&self) {
        self.sweep_at(Utc::now()).await;
    }

    /// Spawn the periodic sweep task. The caller owns the handle and aborts
    /// it on shutdown.
    pub fn start_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let limiter = self;
        let interval = limiter.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep().await;
            }
        })
    }

    async fn check_at(
        &self,
        ip: Option<&str>,
        username: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        // Evaluate both axes even when the first already blocks, so the
        // longer lockout is the one reported.
        let ip_decision = match ip {
            Some(ip) => Self::check_axis(&self.ip_limits, ip, now, &self.config).await,
            None => RateLimitDecision::Allowed,
        };
        let username_decision = Self::check_axis(
            &self.username_limits,
            &username.to_lowercase(),
            now,
            &self.config,
        )
        .await;

        if let RateLimitDecision::Limited { retry_after } = ip_decision {
            warn!(ip, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded for IP");
        }
        if let RateLimitDecision::Limited { retry_after } = username_decision {
            warn!(
                username,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded for username"
            );
        }

        match (ip_decision, username_decision) {
            (
                RateLimitDecision::Limited { retry_after: by_ip },
                RateLimitDecision::Limited { retry_after: by_name },
            ) => RateLimitDecision::Limited {
                retry_after: by_ip.max(by_name),
            },
            (limited @ RateLimitDecision::Limited { .. }, _) => limited,
            (_, limited @ RateLimitDecision::Limited { .. }) => limited,
            _ => RateLimitDecision::Allowed,
        }
    }

    async fn record_failure_at(&self, ip: Option<&str>, username: &str, now: DateTime<Utc>) {
        if let Some(ip) = ip {
            Self::record_axis(&self.ip_limits, ip, now, &self.config).await;
        }
        Self::record_axis(
            &self.username_limits,
            &username.to_lowercase(),
            now,
            &self.config,
        )
        .await;
        debug!(ip, username, "Failed login attempt recorded");
    }

    async fn sweep_at(&self, now: DateTime<Utc>) {
        let ip_cleared = Self::sweep_axis(&self.ip_limits, now, &self.config).await;
        let username_cleared = Self::sweep_axis(&self.username_limits, now, &self.config).await;
        if ip_cleared > 0 || username_cleared > 0 {
            debug!(ip_cleared, username_cleared, "Rate limit entries cleaned up");
        }
    }

    async fn check_axis(
        map: &RwLock<HashMap<String, AttemptEntry>>,
        key: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let mut entries = map.write().await;
        let entry = match entries.get(key).cloned() {
            Some(entry) => match Self::refresh(entry, now, config) {
                Some(entry) => {
                    entries.insert(key.to_string(), entry.clone());
                    entry
                }
                None => {
                    entries.remove(key);
                    return RateLimitDecision::Allowed;
                }
            },
            None => return RateLimitDecision::Allowed,
        };

        match entry.locked_until {
            Some(locked_until) if now < locked_until => RateLimitDecision::Limited {
                retry_after: (locked_until - now).to_std().unwrap_or_default(),
            },
            _ => RateLimitDecision::Allowed,
        }
    }

    async fn record_axis(
        map: &RwLock<HashMap<String, AttemptEntry>>,
        key: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) {
        let mut entries = map.write().await;
        let mut entry = entries
            .get(key)
            .cloned()
            .and_then(|e| Self::refresh(e, now, config))
            .unwrap_or(AttemptEntry {
                attempts: 0,
                first_attempt: now,
                locked_until: None,
            });

        entry.attempts += 1;
        if entry.attempts >= config.max_attempts {
            entry.locked_until = Some(now + Self::backoff(entry.attempts, config));
        }
        entries.insert(key.to_string(), entry);
    }

    async fn sweep_axis(
        map: &RwLock<HashMap<String, AttemptEntry>>,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> usize {
        let mut entries = map.write().await;
        let before = entries.len();
        entries.retain(|_, entry| match Self::refresh(entry.clone(), now, config) {
            Some(refreshed) => {
                *entry = refreshed;
                true
            }
            None => false,
        });
        before - entries.len()
    }

    /// Apply expiry rules to an entry. Returns `None` when the window has
    /// passed with no active lockout (entry is forgotten). An expired lockout
    /// is cleared but the attempt counter is kept, so backoff keeps
    /// escalating for repeat offenders.
    fn refresh(
        mut entry: AttemptEntry,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Option<AttemptEntry> {
        if now - entry.first_attempt > config.window && entry.locked_until.is_none() {
            return None;
        }
        if let Some(locked_until) = entry.locked_until {
            if now > locked_until {
                entry.locked_until = None;
            }
        }
        Some(entry)
    }

    /// `min(base * 2^(attempts - max_attempts), max)`: 1s at the threshold,
    /// then 2s, 4s, ... capped at 15 minutes.
    fn backoff(attempts: u32, config: &RateLimitConfig) -> Duration {
        let exp = attempts.saturating_sub(config.max_attempts).min(30);
        let base_ms = config.base_lockout.num_milliseconds().max(0) as u64;
        let lockout_ms = base_ms.saturating_mul(1u64 << exp);
        let max_ms = config.max_lockout.num_milliseconds().max(0) as u64;
        Duration::milliseconds(lockout_ms.min(max_ms) as i64)
    }
}
