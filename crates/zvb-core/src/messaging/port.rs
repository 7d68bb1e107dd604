use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    Result,
};

/// Outbound side of the chat transport.
///
/// Text is Telegram HTML (`<b>`, `<i>`, `<code>`); callers escape dynamic values.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_document(&self, chat_id: ChatId, path: &Path, caption: &str)
        -> Result<MessageRef>;

    /// Fetch the bytes of an uploaded file.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
