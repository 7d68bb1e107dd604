//! Telegram HTML rendering for menus, account cards and API views.

use crate::{
    api::{locate::IpInfo, AccountRecord, SystemInfo},
    archive::RestoreReport,
    config::AccessMode,
    session::SessionState,
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub const NOT_CONFIGURED: &str = "(not configured)";

pub fn error_html(text: &str) -> String {
    format!("🚨 <b>ERROR:</b> {text}")
}

pub fn main_menu_html(domain: &str, ip: &IpInfo, mode: AccessMode) -> String {
    format!(
        "✨ <b>ZIVPN UDP ADMIN BOT</b> ✨\n\n\
         <b>Server</b>\n\
         🌐 Domain: <code>{}</code>\n\
         🏙️ City: <code>{}</code>\n\
         📡 ISP: <code>{}</code>\n\
         🔐 Mode: <code>{}</code>\n\n\
         👇 <b>Choose an action</b> 👇",
        escape_html(domain),
        escape_html(&ip.city),
        escape_html(&ip.isp),
        mode.as_str(),
    )
}

/// Prompt shown when a session enters `state`.
pub fn session_prompt_html(state: &SessionState) -> String {
    match state {
        SessionState::AwaitingUsername => "👤 <b>New account</b>\n\n\
             Enter a password (3-20 characters: letters, digits, <code>-</code> and <code>_</code>):"
            .to_string(),
        SessionState::AwaitingCreateDays { username } => format!(
            "📅 Duration in days for <code>{}</code> (1-9999):",
            escape_html(username)
        ),
        SessionState::AwaitingRenewDays { username } => format!(
            "📅 How many days to add to <code>{}</code> (1-9999):",
            escape_html(username)
        ),
        SessionState::AwaitingRestoreFile => "📤 Send the backup <b>.zip</b> file to restore.\n\n\
             ⚠️ Current configuration files will be overwritten."
            .to_string(),
    }
}

pub fn account_card_html(rec: &AccountRecord, domain: &str, ip: &IpInfo) -> String {
    format!(
        "🔑 <b>ZIVPN UDP ACCOUNT</b>\n\n\
         <b>Account</b>\n\
         🔓 Password: <code>{}</code>\n\
         📅 Expires: <code>{}</code>\n\n\
         <b>Server</b>\n\
         🌐 Domain: <code>{}</code>\n\
         🏙️ City: <code>{}</code>\n\
         📡 ISP: <code>{}</code>\n\
         📍 IP: <code>{}</code>\n\n\
         🚀 <b>Account ready.</b> Keep the password private.",
        escape_html(&rec.password),
        escape_html(&rec.expired),
        escape_html(domain),
        escape_html(&ip.city),
        escape_html(&ip.isp),
        escape_html(&ip.query),
    )
}

/// Telegram's cap on a message, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Account list split into messages of at most `MAX_MESSAGE_LEN` each.
///
/// Numbering runs across messages; later ones carry a "continued" header.
pub fn account_list_html(accounts: &[AccountRecord]) -> Vec<String> {
    if accounts.is_empty() {
        return vec!["📭 No accounts yet.".to_string()];
    }

    let mut pages = Vec::new();
    let mut current = format!("📋 <b>Accounts ({})</b>\n", accounts.len());
    let mut lines_in_current = 0;
    for (i, a) in accounts.iter().enumerate() {
        let status = if a.status.is_empty() { "-" } else { &a.status };
        let line = format!(
            "\n{}. <code>{}</code> | exp {} | {} | ip limit {}",
            i + 1,
            escape_html(&a.password),
            escape_html(&a.expired),
            escape_html(status),
            a.ip_limit
        );
        if lines_in_current > 0 && utf16_len(&current) + utf16_len(&line) > MAX_MESSAGE_LEN {
            pages.push(std::mem::replace(
                &mut current,
                "📋 <b>Accounts (continued)</b>\n".to_string(),
            ));
            lines_in_current = 0;
        }
        current.push_str(&line);
        lines_in_current += 1;
    }
    pages.push(current);
    pages
}

pub fn system_info_html(info: &SystemInfo) -> String {
    let mut lines = vec!["🖥️ <b>System Info</b>\n".to_string()];
    if info.fields.is_empty() {
        lines.push("No data.".to_string());
    }
    for (key, value) in &info.fields {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!(
            "• <b>{}</b>: <code>{}</code>",
            escape_html(key),
            escape_html(&rendered)
        ));
    }
    lines.join("\n")
}

pub fn restore_summary_html(report: &RestoreReport) -> String {
    let list = |names: &[String]| {
        names
            .iter()
            .map(|n| format!("<code>{}</code>", escape_html(n)))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut lines = vec!["✅ <b>Restore finished.</b>".to_string()];
    if report.restored.is_empty() {
        lines.push("Restored: none".to_string());
    } else {
        lines.push(format!("Restored: {}", list(&report.restored)));
    }
    if !report.skipped.is_empty() {
        lines.push(format!("Skipped: {}", list(&report.skipped)));
    }
    if !report.failed.is_empty() {
        let failed: Vec<String> = report.failed.iter().map(|(n, _)| n.clone()).collect();
        lines.push(format!("⚠️ Failed: {}", list(&failed)));
    }
    lines.push("\n⏳ Restarting the API, ZiVPN and the bot...".to_string());
    lines.join("\n")
}
