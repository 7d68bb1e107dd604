use std::sync::Arc;

use tracing::{debug, error, info};

use super::{api_error_html, failure_html, AdminBot};
use crate::{
    api::{AccountRecord, AccountRequest, ApiReply},
    domain::{ChatId, UserId},
    formatting::{
        account_card_html, account_list_html, error_html, escape_html, system_info_html,
    },
    menu::{self, Purpose},
    messaging::types::TextMessage,
    session::{AccountJob, Lookup, Step},
    Result,
};

impl AdminBot {
    pub(super) async fn on_text(self: &Arc<Self>, msg: TextMessage) -> Result<()> {
        let (chat, user) = (msg.chat_id, msg.user_id);
        let state = match self.sessions.get(user).await {
            Lookup::Idle => {
                debug!(user_id = %user, "text outside a flow, ignoring");
                return Ok(());
            }
            Lookup::Expired => {
                self.delete_quietly(msg.message).await;
                return self.expired(chat, user).await;
            }
            Lookup::Active(state) => state,
        };

        // Inputs can be passwords; keep them out of the chat history.
        self.delete_quietly(msg.message).await;

        match state.on_text(&msg.text) {
            Step::Reprompt(err) => {
                self.sessions.set(user, state).await;
                self.replace_tracked(chat, &format!("❌ {err}"), menu::cancel_keyboard())
                    .await
            }
            Step::Advance(next) => self.enter(chat, user, next).await,
            Step::Dispatch(job) => {
                self.sessions.clear(user).await;
                self.dispatch_account(chat, user, job).await
            }
            Step::Ignore => Ok(()),
        }
    }

    /// Show a progress note and run the API call in the background.
    async fn dispatch_account(self: &Arc<Self>, chat: ChatId, user: UserId, job: AccountJob) -> Result<()> {
        let (name, username) = match &job {
            AccountJob::Create { username, .. } => ("create_account", username),
            AccountJob::Renew { username, .. } => ("renew_account", username),
        };
        info!(user_id = %user, job = name, account = %username, "dispatching account job");

        self.drop_tracked(chat).await;
        let progress = self
            .messenger
            .send_html(
                chat,
                &format!("⏳ Processing <code>{}</code>...", escape_html(username)),
            )
            .await?;
        self.tracker.track(progress).await;

        let bot = Arc::clone(self);
        self.jobs
            .spawn(name, async move { bot.run_account_job(chat, user, job).await });
        Ok(())
    }

    async fn run_account_job(&self, chat: ChatId, user: UserId, job: AccountJob) -> Result<()> {
        let (verb, req, reply) = match job {
            AccountJob::Create { username, days } => {
                let req = AccountRequest {
                    password: username,
                    days,
                };
                let reply = self.api.create_account(&req).await;
                ("create account", req, reply)
            }
            AccountJob::Renew { username, days } => {
                let req = AccountRequest {
                    password: username,
                    days,
                };
                let reply = self.api.renew_account(&req).await;
                ("renew account", req, reply)
            }
        };

        self.drop_tracked(chat).await;
        let outcome = match reply {
            Ok(ApiReply::Success(mut rec)) => {
                if rec.password.is_empty() {
                    rec.password = req.password.clone();
                }
                info!(account = %rec.password, expired = %rec.expired, "account {verb} succeeded");
                let domain = self.domain().await;
                let ip = self.locator.locate().await;
                self.messenger
                    .send_html(chat, &account_card_html(&rec, &domain, &ip))
                    .await?;
                Ok(())
            }
            Ok(ApiReply::Failure { message }) => {
                info!(account = %req.password, message = ?message, "api refused to {verb}");
                self.messenger
                    .send_html(chat, &failure_html(verb, message.as_deref()))
                    .await?;
                Ok(())
            }
            Err(e) => {
                self.messenger.send_html(chat, &api_error_html(&e)).await?;
                Err(e)
            }
        };

        self.show_main_menu(chat, user).await?;
        outcome
    }

    /// Fetch accounts, reporting any failure to the chat.
    async fn fetch_accounts(&self, chat: ChatId) -> Result<Option<Vec<AccountRecord>>> {
        match self.api.list_accounts().await {
            Ok(ApiReply::Success(accounts)) => Ok(Some(accounts)),
            Ok(ApiReply::Failure { message }) => {
                self.messenger
                    .send_html(chat, &failure_html("list accounts", message.as_deref()))
                    .await?;
                Ok(None)
            }
            Err(e) => {
                self.messenger.send_html(chat, &api_error_html(&e)).await?;
                Ok(None)
            }
        }
    }

    pub(super) async fn show_picker(&self, chat: ChatId, purpose: Purpose, page: usize) -> Result<()> {
        let Some(accounts) = self.fetch_accounts(chat).await? else {
            return Ok(());
        };
        if accounts.is_empty() {
            return self
                .replace_tracked(chat, "📭 No accounts yet.", menu::back_keyboard())
                .await;
        }

        let (page, keyboard) = menu::account_picker(&accounts, purpose, page, self.cfg.page_size);
        let pages = menu::page_count(accounts.len(), self.cfg.page_size);
        let title = match purpose {
            Purpose::Renew => "🔄 <b>Select an account to renew</b>",
            Purpose::Delete => "🗑️ <b>Select an account to delete</b>",
        };
        self.replace_tracked(chat, &format!("{title}\nPage {page}/{pages}"), keyboard)
            .await
    }

    pub(super) async fn confirm_delete(&self, chat: ChatId, username: &str) -> Result<()> {
        let html = format!(
            "⚠️ Delete account <code>{}</code>?\nThis cannot be undone.",
            escape_html(username)
        );
        self.replace_tracked(chat, &html, menu::confirm_delete_keyboard(username))
            .await
    }

    pub(super) async fn delete_account(&self, chat: ChatId, user: UserId, username: &str) -> Result<()> {
        self.drop_tracked(chat).await;
        match self.api.delete_account(username).await {
            Ok(ApiReply::Success(())) => {
                info!(user_id = %user, account = %username, "account deleted");
                self.messenger
                    .send_html(
                        chat,
                        &format!("✅ Account <code>{}</code> deleted.", escape_html(username)),
                    )
                    .await?;
            }
            Ok(ApiReply::Failure { message }) => {
                self.messenger
                    .send_html(chat, &failure_html("delete account", message.as_deref()))
                    .await?;
            }
            Err(e) => {
                self.messenger.send_html(chat, &api_error_html(&e)).await?;
            }
        }
        self.show_main_menu(chat, user).await
    }

    pub(super) async fn show_list(&self, chat: ChatId) -> Result<()> {
        let Some(accounts) = self.fetch_accounts(chat).await? else {
            return Ok(());
        };
        let pages = account_list_html(&accounts);
        let Some((last, earlier)) = pages.split_last() else {
            return Ok(());
        };
        self.drop_tracked(chat).await;
        for page in earlier {
            self.messenger.send_html(chat, page).await?;
        }
        self.replace_tracked(chat, last, menu::back_keyboard()).await
    }

    pub(super) async fn show_info(&self, chat: ChatId) -> Result<()> {
        let html = match self.api.system_info().await {
            Ok(ApiReply::Success(info)) => system_info_html(&info),
            Ok(ApiReply::Failure { message }) => {
                failure_html("read system info", message.as_deref())
            }
            Err(e) => api_error_html(&e),
        };
        self.replace_tracked(chat, &html, menu::back_keyboard()).await
    }

    /// Flip public/private and persist it; the old mode is kept if saving fails.
    pub(super) async fn toggle_mode(&self, chat: ChatId, user: UserId) -> Result<()> {
        let saved = {
            let mut settings = self.settings.write().await;
            let previous = settings.mode;
            settings.mode = previous.toggled();
            match settings.save(&self.cfg.paths) {
                Ok(()) => Ok(settings.mode),
                Err(e) => {
                    settings.mode = previous;
                    Err(e)
                }
            }
        };

        match saved {
            Ok(mode) => {
                info!(user_id = %user, mode = mode.as_str(), "access mode changed");
                self.drop_tracked(chat).await;
                self.messenger
                    .send_html(chat, &format!("🔐 Mode is now <b>{}</b>.", mode.as_str()))
                    .await?;
            }
            Err(e) => {
                error!(error = %e, path = %self.cfg.paths.bot_config().display(), "failed to save mode");
                self.drop_tracked(chat).await;
                self.messenger
                    .send_html(
                        chat,
                        &error_html(&format!(
                            "Failed to save the mode: {}",
                            escape_html(&e.to_string())
                        )),
                    )
                    .await?;
            }
        }
        self.show_main_menu(chat, user).await
    }
}
