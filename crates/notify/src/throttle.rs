use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Per-user cooldown for violation notifications.
///
/// Process-local by design: with several collector replicas the effective
/// cooldown per user is still at least one window per replica.
pub struct ViolationThrottle {
    last_sent: DashMap<Uuid, DateTime<Utc>>,
    cooldown: Duration,
    max_entry_age: Duration,
}

impl ViolationThrottle {
    /// 15-minute cooldown, entries evicted after an hour.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cooldown(Duration::minutes(15))
    }

    #[must_use]
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            last_sent: DashMap::new(),
            cooldown,
            max_entry_age: Duration::hours(1),
        }
    }

    /// Whether a violation for `user` may be sent now. Arms the cooldown
    /// when it returns `true`.
    pub fn allow(&self, user: Uuid) -> bool {
        let now = Utc::now();
        if let Some(last) = self.last_sent.get(&user)
            && now - *last < self.cooldown
        {
            return false;
        }
        self.last_sent.insert(user, now);
        true
    }

    /// Evict entries old enough to be irrelevant.
    pub fn sweep(&self) {
        let now = Utc::now();
        self.last_sent.retain(|_, sent| now - *sent <= self.max_entry_age);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

impl Default for ViolationThrottle {
    fn default() -> Self {
        Self::new()
    }
}
