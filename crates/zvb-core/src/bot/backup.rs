use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::AdminBot;
use crate::{
    archive::{build_backup, Restorer, TempArchive},
    domain::{ChatId, UserId},
    errors::Error,
    formatting::{error_html, escape_html, restore_summary_html},
    messaging::types::DocumentMessage,
    session::{Lookup, SessionState},
    Result,
};

const BACKUP_CAPTION: &str = "✅ Backup Data ZiVPN";

fn backup_file_name() -> String {
    format!("zivpn-backup-{}.zip", Local::now().format("%Y%m%d-%H%M%S"))
}

impl AdminBot {
    pub(super) async fn run_backup(&self, chat: ChatId, user: UserId) -> Result<()> {
        self.drop_tracked(chat).await;
        let progress = self
            .messenger
            .send_html(chat, "⏳ Preparing backup...")
            .await?;

        let sources = self.cfg.paths.backup_sources();
        let built = tokio::task::spawn_blocking(move || build_backup(&sources))
            .await
            .map_err(|e| Error::External(format!("backup task failed: {e}")))?;
        self.delete_quietly(progress).await;

        let archive = match built {
            Ok(a) => {
                if a.included.is_empty() {
                    warn!("no configuration files found, sending an empty backup");
                }
                a
            }
            Err(e) => {
                error!(error = %e, "failed to build backup");
                self.messenger
                    .send_html(
                        chat,
                        &error_html(&format!(
                            "Failed to build the backup: {}",
                            escape_html(&e.to_string())
                        )),
                    )
                    .await?;
                return self.show_main_menu(chat, user).await;
            }
        };

        let sent = match TempArchive::write(&self.cfg.temp_dir, &backup_file_name(), &archive.bytes) {
            Ok(temp) => {
                let sent = self
                    .messenger
                    .send_document(chat, temp.path(), BACKUP_CAPTION)
                    .await;
                drop(temp);
                sent
            }
            Err(e) => Err(e),
        };

        match sent {
            Ok(_) => info!(files = ?archive.included, skipped = ?archive.skipped, "backup sent"),
            Err(e) => {
                error!(error = %e, "failed to deliver backup");
                self.messenger
                    .send_html(
                        chat,
                        &error_html(&format!(
                            "Failed to send the backup: {}",
                            escape_html(&e.to_string())
                        )),
                    )
                    .await?;
            }
        }
        self.show_main_menu(chat, user).await
    }

    pub(super) async fn on_document(self: &Arc<Self>, doc: DocumentMessage) -> Result<()> {
        let (chat, user) = (doc.chat_id, doc.user_id);
        match self.sessions.get(user).await {
            Lookup::Active(SessionState::AwaitingRestoreFile) => {}
            Lookup::Expired => return self.expired(chat, user).await,
            _ => {
                debug!(user_id = %user, "document outside the restore flow, ignoring");
                return Ok(());
            }
        }

        let admin = self.settings.read().await.admin();
        if user != admin {
            warn!(user_id = %user, "restore upload from non-admin rejected");
            self.sessions.clear(user).await;
            self.messenger
                .send_html(
                    chat,
                    &error_html("Only the administrator may restore backups."),
                )
                .await?;
            return Ok(());
        }

        let is_zip = doc
            .file_name
            .as_deref()
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".zip"));
        if !is_zip {
            self.messenger
                .send_html(chat, &error_html("Please send a <b>.zip</b> backup file."))
                .await?;
            return Ok(());
        }
        if doc.file_size > self.cfg.max_upload_bytes {
            warn!(size = doc.file_size, max = self.cfg.max_upload_bytes, "backup upload too large");
            self.messenger
                .send_html(chat, &error_html("The backup file is too large."))
                .await?;
            return Ok(());
        }

        self.sessions.clear(user).await;
        self.drop_tracked(chat).await;

        let downloaded = self.messenger.download_file(&doc.file_id).await;
        // The archive carries the API key and bot token.
        self.delete_quietly(doc.message).await;
        let bytes = match downloaded {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to download backup");
                self.messenger
                    .send_html(
                        chat,
                        &error_html(&format!(
                            "Failed to download the backup: {}",
                            escape_html(&e.to_string())
                        )),
                    )
                    .await?;
                return self.show_main_menu(chat, user).await;
            }
        };

        let restorer = Restorer::new(self.cfg.paths.dir.clone(), admin);
        let applied = tokio::task::spawn_blocking(move || restorer.apply(user, &bytes))
            .await
            .map_err(|e| Error::External(format!("restore task failed: {e}")))?;

        let report = match applied {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "restore failed");
                let text = match &e {
                    Error::Archive(_) => "Not a valid backup archive.".to_string(),
                    other => format!("Restore failed: {}", escape_html(&other.to_string())),
                };
                self.messenger.send_html(chat, &error_html(&text)).await?;
                return self.show_main_menu(chat, user).await;
            }
        };

        info!(
            restored = ?report.restored,
            skipped = ?report.skipped,
            failed = report.failed.len(),
            "backup restored"
        );
        self.messenger
            .send_html(chat, &restore_summary_html(&report))
            .await?;
        self.spawn_restart();
        Ok(())
    }

    /// The last step restarts this process, so nothing is reported afterwards.
    fn spawn_restart(&self) {
        let plan = self.cfg.restart.clone();
        let services = Arc::clone(&self.services);
        self.jobs.spawn("restart_services", async move {
            let outcomes = plan.run(services.as_ref()).await;
            let failed: Vec<&str> = outcomes
                .iter()
                .filter(|o| o.restarted.is_err())
                .map(|o| o.unit.as_str())
                .collect();
            if failed.is_empty() {
                Ok(())
            } else {
                Err(Error::External(format!(
                    "restart failed for {}",
                    failed.join(", ")
                )))
            }
        });
    }
}
