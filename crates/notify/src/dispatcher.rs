use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use argus_core::{ControlEvent, User, ViolationScore};

use crate::render;
use crate::throttle::ViolationThrottle;
use crate::topic::{NotifyConfig, Topic};

/// Delivery failure. Logged by the dispatcher, never propagated.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery contract of the chat front-end. The dispatcher renders and
/// routes; implementations only move text.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: String,
    ) -> Result<(), NotifyError>;
}

/// Topic-routed, throttled notification dispatcher.
pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    config: NotifyConfig,
    throttle: ViolationThrottle,
}

impl Dispatcher {
    #[must_use]
    pub fn new(messenger: Arc<dyn Messenger>, config: NotifyConfig) -> Self {
        Self {
            messenger,
            config,
            throttle: ViolationThrottle::new(),
        }
    }

    /// Dispatch a violation verdict, throttled to one per user per window
    /// unless `force` is set.
    pub async fn violation(
        &self,
        user_uuid: Uuid,
        score: &ViolationScore,
        user: Option<&User>,
        force: bool,
    ) {
        if !self.config.enabled() {
            debug!("notifications disabled, dropping violation message");
            return;
        }
        if !force && !self.throttle.allow(user_uuid) {
            info!(user = %user_uuid, "violation notification throttled");
            return;
        }
        if force {
            // Still arm the cooldown so the next unforced send waits.
            let _ = self.throttle.allow(user_uuid);
        }
        self.throttle.sweep();

        let text = render::render_violation(user_uuid, score, user);
        self.deliver(Topic::Violations, text).await;
    }

    /// Dispatch a lifecycle event. Never throttled.
    pub async fn lifecycle(&self, event: &ControlEvent) {
        if !self.config.enabled() {
            return;
        }
        let topic = Topic::for_family(event.family());
        let text = render::render_lifecycle(event);
        self.deliver(topic, text).await;
    }

    /// Evict stale throttle entries. Called from a background task.
    pub fn sweep_throttle(&self) {
        self.throttle.sweep();
    }

    async fn deliver(&self, topic: Topic, text: String) {
        let Some(chat_id) = self.config.chat_id else {
            return;
        };
        let thread = self.config.thread_for(topic);
        if let Err(e) = self.messenger.send(chat_id, thread, text).await {
            // Best-effort by contract: a failed notification must never
            // abort the batch or sync that triggered it.
            warn!(topic = topic.as_str(), error = %e, "notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use argus_core::{ScoreBreakdown, ViolationAction};

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(i64, Option<i64>, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(
            &self,
            chat_id: i64,
            thread_id: Option<i64>,
            text: String,
        ) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError("chat unreachable".to_owned()));
            }
            self.sent.lock().unwrap().push((chat_id, thread_id, text));
            Ok(())
        }
    }

    fn config() -> NotifyConfig {
        NotifyConfig {
            chat_id: Some(-100),
            violations_topic_id: Some(7),
            users_topic_id: Some(3),
            ..NotifyConfig::default()
        }
    }

    fn score() -> ViolationScore {
        ViolationScore {
            total: 85.0,
            breakdown: ScoreBreakdown::default(),
            recommended_action: ViolationAction::TempBlock,
            confidence: 0.85,
            reasons: vec!["overlap".to_owned()],
        }
    }

    #[tokio::test]
    async fn violation_routes_to_the_violations_thread() {
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::new(messenger.clone(), config());
        dispatcher.violation(Uuid::new_v4(), &score(), None, false).await;

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, -100);
        assert_eq!(sent[0].1, Some(7));
    }

    #[tokio::test]
    async fn repeat_violation_is_throttled_but_force_breaks_through() {
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::new(messenger.clone(), config());
        let user = Uuid::new_v4();

        dispatcher.violation(user, &score(), None, false).await;
        dispatcher.violation(user, &score(), None, false).await;
        assert_eq!(messenger.sent.lock().unwrap().len(), 1);

        dispatcher.violation(user, &score(), None, true).await;
        assert_eq!(messenger.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lifecycle_events_are_never_throttled() {
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::new(messenger.clone(), config());
        let event = ControlEvent {
            event: "user.modified".to_owned(),
            data: serde_json::json!({"uuid": "u1", "username": "alice"}),
            timestamp: None,
        };
        dispatcher.lifecycle(&event).await;
        dispatcher.lifecycle(&event).await;

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, Some(3));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..RecordingMessenger::default()
        });
        let dispatcher = Dispatcher::new(messenger, config());
        // Must not panic or propagate.
        dispatcher.violation(Uuid::new_v4(), &score(), None, false).await;
    }

    #[tokio::test]
    async fn disabled_config_drops_everything() {
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::new(messenger.clone(), NotifyConfig::default());
        dispatcher.violation(Uuid::new_v4(), &score(), None, false).await;
        assert!(messenger.sent.lock().unwrap().is_empty());
    }
}
