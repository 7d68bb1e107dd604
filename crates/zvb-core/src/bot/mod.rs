//! Application service: routes inbound updates through access control, the
//! session state machine and the backends, and renders the replies.

mod backup;
mod flows;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    api::{locate::ServerLocator, ProvisioningApi},
    config::{BotConfig, Config},
    dispatch::TaskSupervisor,
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    formatting::{error_html, escape_html, main_menu_html, session_prompt_html, NOT_CONFIGURED},
    menu::{self, MenuAction},
    messaging::{
        port::MessagingPort,
        tracker::MessageTracker,
        types::{CallbackQuery, Command, IncomingUpdate, InlineKeyboard},
    },
    restart::ServiceManager,
    session::{Lookup, SessionState, SessionStore, UserLocks},
    Result,
};

const ACCESS_DENIED: &str = "⛔ Access denied. This bot is private.";
const SESSION_EXPIRED: &str = "⌛ Session expired. Please start again.";

/// Everything outside the chat transport the bot talks to.
pub struct Backends {
    pub api: Arc<dyn ProvisioningApi>,
    pub services: Arc<dyn ServiceManager>,
    pub locator: Arc<dyn ServerLocator>,
}

pub struct AdminBot {
    cfg: Arc<Config>,
    /// Mutable part of `bot-config.json` (the access mode).
    settings: RwLock<BotConfig>,
    messenger: Arc<dyn MessagingPort>,
    api: Arc<dyn ProvisioningApi>,
    services: Arc<dyn ServiceManager>,
    locator: Arc<dyn ServerLocator>,
    sessions: SessionStore,
    tracker: MessageTracker,
    locks: UserLocks,
    jobs: TaskSupervisor,
}

impl AdminBot {
    pub fn new(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>, backends: Backends) -> Self {
        let jobs = TaskSupervisor::new(cfg.max_jobs);
        Self::with_supervisor(cfg, messenger, backends, jobs)
    }

    pub fn with_supervisor(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        backends: Backends,
        jobs: TaskSupervisor,
    ) -> Self {
        Self {
            settings: RwLock::new(cfg.bot.clone()),
            sessions: SessionStore::new(cfg.session_ttl),
            tracker: MessageTracker::default(),
            locks: UserLocks::default(),
            messenger,
            api: backends.api,
            services: backends.services,
            locator: backends.locator,
            jobs,
            cfg,
        }
    }

    /// Wait for background jobs spawned so far.
    pub async fn wait_idle(&self) {
        self.jobs.wait_idle().await;
    }

    /// Cancel background jobs at their next suspension point.
    pub fn shutdown(&self) {
        self.jobs.cancel_all();
    }

    /// Handle one inbound update. Updates from the same allowed user are
    /// serialized; denied users never take a lock.
    pub async fn handle(self: &Arc<Self>, update: IncomingUpdate) -> Result<()> {
        let user = update.user_id();
        if !self.settings.read().await.is_allowed(user) {
            return self.deny(&update).await;
        }
        let _turn = self.locks.lock_user(user).await;

        match update {
            IncomingUpdate::Command(cmd) => self.on_command(cmd).await,
            IncomingUpdate::Text(msg) => self.on_text(msg).await,
            IncomingUpdate::Document(doc) => self.on_document(doc).await,
            IncomingUpdate::Callback(q) => self.on_callback(q).await,
        }
    }

    async fn deny(&self, update: &IncomingUpdate) -> Result<()> {
        info!(user_id = %update.user_id(), "access denied");
        match update {
            IncomingUpdate::Callback(q) => {
                self.messenger
                    .answer_callback_query(&q.callback_id, Some(ACCESS_DENIED))
                    .await
            }
            IncomingUpdate::Command(Command { chat_id, .. }) => self.deny_in(*chat_id).await,
            IncomingUpdate::Text(t) => self.deny_in(t.chat_id).await,
            IncomingUpdate::Document(d) => self.deny_in(d.chat_id).await,
        }
    }

    async fn deny_in(&self, chat_id: ChatId) -> Result<()> {
        self.messenger
            .send_html(chat_id, &error_html(ACCESS_DENIED))
            .await?;
        Ok(())
    }

    async fn on_command(self: &Arc<Self>, cmd: Command) -> Result<()> {
        // Anything typed mid-flow may be a password attempt.
        if self.sessions.get(cmd.user_id).await != Lookup::Idle {
            self.delete_quietly(cmd.message).await;
        }

        match cmd.name.as_str() {
            "start" | "menu" => {
                self.sessions.clear(cmd.user_id).await;
                self.show_main_menu(cmd.chat_id, cmd.user_id).await
            }
            "cancel" => {
                self.sessions.clear(cmd.user_id).await;
                self.cancelled(cmd.chat_id, cmd.user_id).await
            }
            other => {
                debug!(command = other, "unknown command");
                self.messenger
                    .send_html(
                        cmd.chat_id,
                        &error_html("Unknown command. Use /start to open the menu."),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn on_callback(self: &Arc<Self>, q: CallbackQuery) -> Result<()> {
        let Some(action) = MenuAction::parse(&q.data) else {
            warn!(data = %q.data, "unknown callback data");
            return self
                .messenger
                .answer_callback_query(&q.callback_id, Some("Unknown action"))
                .await;
        };

        if !action.is_pagination() {
            self.sessions.clear(q.user_id).await;
        }

        if action.admin_only() && !self.is_admin(q.user_id).await {
            warn!(user_id = %q.user_id, action = %action, "admin-only action refused");
            return self
                .messenger
                .answer_callback_query(&q.callback_id, Some("⛔ Admin only"))
                .await;
        }

        if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
            debug!(error = %e, "failed to answer callback query");
        }

        let (chat, user) = (q.chat_id, q.user_id);
        match action {
            MenuAction::MainMenu => self.show_main_menu(chat, user).await,
            MenuAction::Cancel => self.cancelled(chat, user).await,
            MenuAction::Create => self.enter(chat, user, SessionState::AwaitingUsername).await,
            MenuAction::Renew => self.show_picker(chat, menu::Purpose::Renew, 1).await,
            MenuAction::Delete => self.show_picker(chat, menu::Purpose::Delete, 1).await,
            MenuAction::Page { purpose, page } => self.show_picker(chat, purpose, page).await,
            MenuAction::SelectRenew(username) => {
                self.enter(chat, user, SessionState::AwaitingRenewDays { username })
                    .await
            }
            MenuAction::SelectDelete(username) => self.confirm_delete(chat, &username).await,
            MenuAction::ConfirmDelete(username) => {
                self.delete_account(chat, user, &username).await
            }
            MenuAction::List => self.show_list(chat).await,
            MenuAction::Info => self.show_info(chat).await,
            MenuAction::BackupRestore => {
                self.replace_tracked(
                    chat,
                    "💾 <b>Backup & Restore</b>\n\nDownload the current configuration or upload a backup.",
                    menu::backup_restore_keyboard(),
                )
                .await
            }
            MenuAction::Backup => self.run_backup(chat, user).await,
            MenuAction::Restore => self.enter(chat, user, SessionState::AwaitingRestoreFile).await,
            MenuAction::ToggleMode => self.toggle_mode(chat, user).await,
        }
    }

    async fn is_admin(&self, user: UserId) -> bool {
        self.settings.read().await.admin() == user
    }

    async fn domain(&self) -> String {
        let domain = self.settings.read().await.domain.clone();
        if domain.trim().is_empty() {
            NOT_CONFIGURED.to_string()
        } else {
            domain
        }
    }

    /// Start a flow step: remember the state and show its prompt.
    async fn enter(&self, chat: ChatId, user: UserId, state: SessionState) -> Result<()> {
        let prompt = session_prompt_html(&state);
        self.sessions.set(user, state).await;
        self.replace_tracked(chat, &prompt, menu::cancel_keyboard())
            .await
    }

    async fn cancelled(&self, chat: ChatId, user: UserId) -> Result<()> {
        self.drop_tracked(chat).await;
        self.messenger.send_html(chat, "❌ Cancelled.").await?;
        self.show_main_menu(chat, user).await
    }

    async fn expired(&self, chat: ChatId, user: UserId) -> Result<()> {
        info!(user_id = %user, "session expired");
        self.messenger.send_html(chat, SESSION_EXPIRED).await?;
        self.show_main_menu(chat, user).await
    }

    pub(crate) async fn show_main_menu(&self, chat: ChatId, user: UserId) -> Result<()> {
        let (mode, is_admin) = {
            let s = self.settings.read().await;
            (s.mode, s.admin() == user)
        };
        let domain = self.domain().await;
        let ip = self.locator.locate().await;
        let html = main_menu_html(&domain, &ip, mode);
        self.replace_tracked(chat, &html, menu::main_menu_keyboard(is_admin, mode))
            .await
    }

    /// Delete the chat's tracked message, then send and track the replacement.
    async fn replace_tracked(&self, chat: ChatId, html: &str, keyboard: InlineKeyboard) -> Result<()> {
        self.drop_tracked(chat).await;
        let msg = self
            .messenger
            .send_inline_keyboard(chat, html, keyboard)
            .await?;
        self.tracker.track(msg).await;
        Ok(())
    }

    async fn drop_tracked(&self, chat: ChatId) {
        if let Some(prev) = self.tracker.take(chat).await {
            self.delete_quietly(prev).await;
        }
    }

    async fn delete_quietly(&self, msg: MessageRef) {
        if let Err(e) = self.messenger.delete_message(msg).await {
            debug!(chat_id = %msg.chat_id, error = %e, "failed to delete message");
        }
    }
}

/// User-facing summary for a failed provisioning call.
fn api_error_html(e: &Error) -> String {
    let text = match e {
        Error::InvalidResponse(_) => "Invalid response from the provisioning API.".to_string(),
        Error::Config(m) => format!("The provisioning API is not configured: {}", escape_html(m)),
        other => format!(
            "Failed to reach the provisioning API: {}",
            escape_html(&other.to_string())
        ),
    };
    error_html(&text)
}

fn failure_html(action: &str, message: Option<&str>) -> String {
    error_html(&format!(
        "Failed to {action}: {}",
        escape_html(message.unwrap_or("unknown error"))
    ))
}
