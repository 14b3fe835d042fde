//! services/api/src/auth/blacklist.rs
//!
//! In-process set of revoked token strings.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Revoked tokens, each kept until the moment it would have expired anyway.
///
/// Membership is what verification checks; `purge_expired` only bounds memory and
/// is never required for a revoked token to be rejected.
#[derive(Debug, Default)]
pub struct TokenBlacklist {
    revoked: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the token was already revoked.
    pub fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> bool {
        self.write().insert(token.to_string(), expires_at).is_none()
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.read().contains_key(token)
    }

    /// Drops entries whose token has expired, returning how many were removed.
    ///
    /// JWT `exp` has whole-second precision and a token is still accepted during
    /// the second it expires in, so entries are kept through that second too.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut revoked = self.write();
        let before = revoked.len();
        let now_secs = now.timestamp();
        revoked.retain(|_, expires_at| expires_at.timestamp() >= now_secs);
        before - revoked.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.revoked.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.revoked.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Periodically drops expired entries from a shared blacklist.
pub struct BlacklistPurger {
    blacklist: Arc<TokenBlacklist>,
    interval: Duration,
}

impl BlacklistPurger {
    pub fn new(blacklist: Arc<TokenBlacklist>, interval_secs: u64) -> Self {
        Self {
            blacklist,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Runs forever; spawn it onto the runtime.
    pub async fn start(self) {
        info!("Starting token blacklist purger (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            let purged = self.blacklist.purge_expired(Utc::now());
            debug!(purged, remaining = self.blacklist.len(), "purged expired revoked tokens");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn revoked_tokens_stay_revoked_until_purged_after_expiry() {
        let blacklist = TokenBlacklist::new();
        let now = Utc::now();
        assert!(blacklist.revoke("short-lived", now + Duration::minutes(5)));
        assert!(blacklist.revoke("long-lived", now + Duration::days(7)));
        assert!(!blacklist.revoke("long-lived", now + Duration::days(7)));

        assert!(blacklist.is_revoked("short-lived"));
        assert!(!blacklist.is_revoked("never-seen"));

        assert_eq!(blacklist.purge_expired(now), 0);
        assert_eq!(blacklist.purge_expired(now + Duration::minutes(10)), 1);
        assert!(!blacklist.is_revoked("short-lived"));
        assert!(blacklist.is_revoked("long-lived"));
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn entries_survive_the_second_they_expire_in() {
        let blacklist = TokenBlacklist::new();
        let second = Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap();
        blacklist.revoke("last-second", second);

        assert_eq!(blacklist.purge_expired(second + Duration::milliseconds(999)), 0);
        assert!(blacklist.is_revoked("last-second"));

        assert_eq!(blacklist.purge_expired(second + Duration::seconds(1)), 1);
        assert!(blacklist.is_empty());
    }

    #[tokio::test]
    async fn purger_sweeps_on_its_interval() {
        let blacklist = Arc::new(TokenBlacklist::new());
        blacklist.revoke("stale", Utc::now() - Duration::seconds(1));
        blacklist.revoke("fresh", Utc::now() + Duration::days(1));

        let task = tokio::spawn(BlacklistPurger::new(blacklist.clone(), 1).start());
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

        assert!(!blacklist.is_revoked("stale"));
        assert!(blacklist.is_revoked("fresh"));
        task.abort();
    }
}
