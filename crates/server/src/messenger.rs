use async_trait::async_trait;
use tracing::info;

use argus_notify::{Messenger, NotifyError};

/// Stand-in delivery that writes rendered notifications to the service
/// log. The real chat front-end plugs in through [`Messenger`]; this keeps
/// deployments observable before one is attached.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: String,
    ) -> Result<(), NotifyError> {
        info!(chat_id, thread_id, message = %text, "notification");
        Ok(())
    }
}
