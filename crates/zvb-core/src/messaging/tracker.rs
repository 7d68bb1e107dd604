use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::{ChatId, MessageId, MessageRef};

/// Last transient message the bot sent per chat (menus, pickers).
///
/// The next tracked send replaces it; `take` hands it out for deletion.
#[derive(Default)]
pub struct MessageTracker {
    inner: Mutex<HashMap<ChatId, MessageId>>,
}

impl MessageTracker {
    pub async fn track(&self, msg: MessageRef) {
        self.inner.lock().await.insert(msg.chat_id, msg.message_id);
    }

    pub async fn take(&self, chat_id: ChatId) -> Option<MessageRef> {
        self.inner
            .lock()
            .await
            .remove(&chat_id)
            .map(|message_id| MessageRef {
                chat_id,
                message_id,
            })
    }
}
