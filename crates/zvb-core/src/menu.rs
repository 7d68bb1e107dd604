//! Callback-data vocabulary and the inline keyboards built from it.

use std::fmt;

use crate::{
    api::AccountRecord,
    config::AccessMode,
    messaging::types::{InlineButton, InlineKeyboard},
};

/// Which flow an account picker feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Renew,
    Delete,
}

impl Purpose {
    fn as_str(self) -> &'static str {
        match self {
            Purpose::Renew => "renew",
            Purpose::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "renew" => Some(Purpose::Renew),
            "delete" => Some(Purpose::Delete),
            _ => None,
        }
    }
}

/// Everything a button can ask for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuAction {
    MainMenu,
    Create,
    Renew,
    Delete,
    List,
    Info,
    BackupRestore,
    Backup,
    Restore,
    ToggleMode,
    Cancel,
    Page { purpose: Purpose, page: usize },
    SelectRenew(String),
    SelectDelete(String),
    ConfirmDelete(String),
}

impl MenuAction {
    pub fn parse(data: &str) -> Option<Self> {
        let simple = match data {
            "menu_main" => Some(MenuAction::MainMenu),
            "menu_create" => Some(MenuAction::Create),
            "menu_renew" => Some(MenuAction::Renew),
            "menu_delete" => Some(MenuAction::Delete),
            "menu_list" => Some(MenuAction::List),
            "menu_info" => Some(MenuAction::Info),
            "menu_backup_restore" => Some(MenuAction::BackupRestore),
            "menu_backup_action" => Some(MenuAction::Backup),
            "menu_restore_action" => Some(MenuAction::Restore),
            "toggle_mode" => Some(MenuAction::ToggleMode),
            "cancel" => Some(MenuAction::Cancel),
            _ => None,
        };
        if simple.is_some() {
            return simple;
        }

        if let Some(rest) = data.strip_prefix("page_") {
            let (purpose, page) = rest.split_once('_')?;
            return Some(MenuAction::Page {
                purpose: Purpose::parse(purpose)?,
                page: page.parse().ok()?,
            });
        }

        let (kind, name) = data.split_once(':')?;
        if name.is_empty() {
            return None;
        }
        match kind {
            "select_renew" => Some(MenuAction::SelectRenew(name.to_string())),
            "select_delete" => Some(MenuAction::SelectDelete(name.to_string())),
            "confirm_delete" => Some(MenuAction::ConfirmDelete(name.to_string())),
            _ => None,
        }
    }

    /// Whether only the configured admin may trigger this action.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            MenuAction::List
                | MenuAction::Info
                | MenuAction::BackupRestore
                | MenuAction::Backup
                | MenuAction::Restore
                | MenuAction::ToggleMode
        )
    }

    pub fn is_pagination(&self) -> bool {
        matches!(self, MenuAction::Page { .. })
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuAction::MainMenu => f.write_str("menu_main"),
            MenuAction::Create => f.write_str("menu_create"),
            MenuAction::Renew => f.write_str("menu_renew"),
            MenuAction::Delete => f.write_str("menu_delete"),
            MenuAction::List => f.write_str("menu_list"),
            MenuAction::Info => f.write_str("menu_info"),
            MenuAction::BackupRestore => f.write_str("menu_backup_restore"),
            MenuAction::Backup => f.write_str("menu_backup_action"),
            MenuAction::Restore => f.write_str("menu_restore_action"),
            MenuAction::ToggleMode => f.write_str("toggle_mode"),
            MenuAction::Cancel => f.write_str("cancel"),
            MenuAction::Page { purpose, page } => write!(f, "page_{}_{page}", purpose.as_str()),
            MenuAction::SelectRenew(name) => write!(f, "select_renew:{name}"),
            MenuAction::SelectDelete(name) => write!(f, "select_delete:{name}"),
            MenuAction::ConfirmDelete(name) => write!(f, "confirm_delete:{name}"),
        }
    }
}

fn button(label: &str, action: MenuAction) -> InlineButton {
    InlineButton::new(label, action.to_string())
}

pub fn main_menu_keyboard(is_admin: bool, mode: AccessMode) -> InlineKeyboard {
    let mut kb = InlineKeyboard::default()
        .row(vec![button("➕ Create Account", MenuAction::Create)])
        .row(vec![
            button("🔄 Renew", MenuAction::Renew),
            button("🗑️ Delete", MenuAction::Delete),
        ]);

    if is_admin {
        let toggle = format!("🔐 Mode: {} (toggle)", mode.as_str());
        kb = kb
            .row(vec![
                button("📋 List Accounts", MenuAction::List),
                button("🖥️ System Info", MenuAction::Info),
            ])
            .row(vec![button("💾 Backup & Restore", MenuAction::BackupRestore)])
            .row(vec![button(&toggle, MenuAction::ToggleMode)]);
    }
    kb
}

pub fn cancel_keyboard() -> InlineKeyboard {
    InlineKeyboard::default().row(vec![button("❌ Cancel", MenuAction::Cancel)])
}

pub fn back_keyboard() -> InlineKeyboard {
    InlineKeyboard::default().row(vec![button("🏠 Main Menu", MenuAction::MainMenu)])
}

pub fn backup_restore_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![
            button("⬇️ Backup", MenuAction::Backup),
            button("⬆️ Restore", MenuAction::Restore),
        ])
        .row(vec![button("🏠 Main Menu", MenuAction::MainMenu)])
}

pub fn confirm_delete_keyboard(name: &str) -> InlineKeyboard {
    InlineKeyboard::default().row(vec![
        button("✅ Yes, delete", MenuAction::ConfirmDelete(name.to_string())),
        button("❌ Cancel", MenuAction::Cancel),
    ])
}

/// Number of pages needed for `total` items; at least one.
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

/// One page of account buttons with prev/next navigation and a cancel row.
///
/// `page` is 1-based and clamped into range.
pub fn account_picker(
    accounts: &[AccountRecord],
    purpose: Purpose,
    page: usize,
    page_size: usize,
) -> (usize, InlineKeyboard) {
    let page_size = page_size.max(1);
    let pages = page_count(accounts.len(), page_size);
    let page = page.clamp(1, pages);

    let mut kb = InlineKeyboard::default();
    for rec in accounts.iter().skip((page - 1) * page_size).take(page_size) {
        let action = match purpose {
            Purpose::Renew => MenuAction::SelectRenew(rec.password.clone()),
            Purpose::Delete => MenuAction::SelectDelete(rec.password.clone()),
        };
        kb = kb.row(vec![button(&format!("👤 {}", rec.password), action)]);
    }

    let mut nav = Vec::new();
    if page > 1 {
        nav.push(button(
            "⬅️ Prev",
            MenuAction::Page {
                purpose,
                page: page - 1,
            },
        ));
    }
    if page < pages {
        nav.push(button(
            "Next ➡️",
            MenuAction::Page {
                purpose,
                page: page + 1,
            },
        ));
    }
    kb = kb.row(nav).row(vec![button("❌ Cancel", MenuAction::Cancel)]);

    (page, kb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts(n: usize) -> Vec<AccountRecord> {
        (0..n)
            .map(|i| AccountRecord {
                password: format!("user{i:02}"),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn parses_what_it_renders() {
        for action in [
            MenuAction::Create,
            MenuAction::Backup,
            MenuAction::Page {
                purpose: Purpose::Delete,
                page: 3,
            },
            MenuAction::SelectRenew("alice_01".to_string()),
            MenuAction::ConfirmDelete("bob-2".to_string()),
        ] {
            assert_eq!(MenuAction::parse(&action.to_string()), Some(action));
        }
    }

    #[test]
    fn rejects_unknown_or_malformed_data() {
        assert_eq!(MenuAction::parse("askuser:1:2"), None);
        assert_eq!(MenuAction::parse("page_renew_x"), None);
        assert_eq!(MenuAction::parse("page_upgrade_2"), None);
        assert_eq!(MenuAction::parse("select_renew:"), None);
        assert_eq!(MenuAction::parse(""), None);
    }

    #[test]
    fn admin_keyboard_has_admin_actions() {
        let user: Vec<String> = main_menu_keyboard(false, AccessMode::Public)
            .buttons()
            .map(|b| b.callback_data.clone())
            .collect();
        assert!(!user.contains(&"menu_backup_restore".to_string()));

        let admin: Vec<String> = main_menu_keyboard(true, AccessMode::Private)
            .buttons()
            .map(|b| b.callback_data.clone())
            .collect();
        assert!(admin.contains(&"menu_backup_restore".to_string()));
        assert!(admin.contains(&"toggle_mode".to_string()));
    }

    #[test]
    fn picker_pages_and_navigation() {
        let all = accounts(23);

        let (page, kb) = account_picker(&all, Purpose::Renew, 1, 10);
        assert_eq!(page, 1);
        let data: Vec<String> = kb.buttons().map(|b| b.callback_data.clone()).collect();
        assert_eq!(data[0], "select_renew:user00");
        assert!(data.contains(&"page_renew_2".to_string()));
        assert!(!data.iter().any(|d| d == "page_renew_0"));

        let (page, kb) = account_picker(&all, Purpose::Delete, 99, 10);
        assert_eq!(page, 3);
        let data: Vec<String> = kb.buttons().map(|b| b.callback_data.clone()).collect();
        assert_eq!(data[0], "select_delete:user20");
        assert!(data.contains(&"page_delete_2".to_string()));
        assert_eq!(data.last().map(String::as_str), Some("cancel"));
    }
}
