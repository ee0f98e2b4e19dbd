use serde::Deserialize;

use argus_core::EventFamily;

/// Operator-chat topics. Every notification lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Users,
    Nodes,
    Service,
    Hwid,
    Crm,
    Errors,
    Violations,
}

impl Topic {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Nodes => "nodes",
            Self::Service => "service",
            Self::Hwid => "hwid",
            Self::Crm => "crm",
            Self::Errors => "errors",
            Self::Violations => "violations",
        }
    }

    /// Topic an event family is routed to.
    #[must_use]
    pub fn for_family(family: EventFamily) -> Self {
        match family {
            EventFamily::User => Self::Users,
            EventFamily::Node => Self::Nodes,
            EventFamily::Host | EventFamily::Service | EventFamily::Other => Self::Service,
            EventFamily::HwidDevice => Self::Hwid,
            EventFamily::Crm => Self::Crm,
            EventFamily::Errors => Self::Errors,
        }
    }
}

/// Chat and per-topic thread routing.
///
/// Notifications are disabled entirely when `chat_id` is unset. A topic
/// without its own thread id falls back to the chat's default thread.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub chat_id: Option<i64>,
    pub users_topic_id: Option<i64>,
    pub nodes_topic_id: Option<i64>,
    pub service_topic_id: Option<i64>,
    pub hwid_topic_id: Option<i64>,
    pub crm_topic_id: Option<i64>,
    pub errors_topic_id: Option<i64>,
    pub violations_topic_id: Option<i64>,
}

impl NotifyConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.chat_id.is_some()
    }

    #[must_use]
    pub fn thread_for(&self, topic: Topic) -> Option<i64> {
        match topic {
            Topic::Users => self.users_topic_id,
            Topic::Nodes => self.nodes_topic_id,
            Topic::Service => self.service_topic_id,
            Topic::Hwid => self.hwid_topic_id,
            Topic::Crm => self.crm_topic_id,
            Topic::Errors => self.errors_topic_id,
            Topic::Violations => self.violations_topic_id,
        }
    }
}
