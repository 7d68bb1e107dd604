//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into a transport-neutral
//! `IncomingUpdate` and hands it to the core `AdminBot`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{debug, error};

use zvb_core::{
    bot::AdminBot,
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{self, IncomingUpdate},
};

/// Lowercase command name from `/cmd@botname args`; arguments are dropped.
pub(crate) fn parse_command(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or("");
    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Map a message to a core update. Unsupported message kinds yield `None`.
pub(crate) fn message_update(msg: &Message) -> Option<IncomingUpdate> {
    let user = msg.from()?;
    let chat_id = ChatId(msg.chat.id.0);
    let user_id = UserId(user.id.0 as i64);
    let message = MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    };

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return Some(IncomingUpdate::Command(types::Command {
                chat_id,
                user_id,
                name: parse_command(text),
                message,
            }));
        }
        return Some(IncomingUpdate::Text(types::TextMessage {
            chat_id,
            user_id,
            text: text.to_string(),
            message,
        }));
    }

    let doc = msg.document()?;
    Some(IncomingUpdate::Document(types::DocumentMessage {
        chat_id,
        user_id,
        file_id: doc.file.id.clone(),
        file_name: doc.file_name.clone(),
        file_size: u64::from(doc.file.size),
        message,
    }))
}

pub(crate) fn callback_update(q: &CallbackQuery) -> Option<IncomingUpdate> {
    let msg = q.message.as_ref()?;
    let chat_id = ChatId(msg.chat.id.0);
    Some(IncomingUpdate::Callback(types::CallbackQuery {
        chat_id,
        user_id: UserId(q.from.id.0 as i64),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
    }))
}

pub async fn handle_message(msg: Message, app: Arc<AdminBot>) -> ResponseResult<()> {
    let Some(update) = message_update(&msg) else {
        debug!(chat_id = msg.chat.id.0, "unsupported message kind, ignoring");
        return Ok(());
    };

    if let Err(e) = app.handle(update).await {
        error!(chat_id = msg.chat.id.0, error = %e, "failed to handle message");
    }
    Ok(())
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    app: Arc<AdminBot>,
) -> ResponseResult<()> {
    let Some(update) = callback_update(&q) else {
        // Always answer so the client stops spinning.
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    if let Err(e) = app.handle(update).await {
        error!(user_id = q.from.id.0, error = %e, "failed to handle callback");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(parse_command("/start@zivpn_bot"), "start");
        assert_eq!(parse_command("  /Cancel now please "), "cancel");
        assert_eq!(parse_command("/"), "");
    }
}
