//! Per-user conversation state for the multi-step account flows.
//!
//! Transitions are pure (`SessionState::on_text`) so they can be tested without
//! a transport; `SessionStore` and `UserLocks` hold the shared maps.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
    time::Duration,
};

use regex::Regex;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::Instant,
};

use crate::domain::UserId;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 9999;

/// Where a user is inside a multi-step flow. Idle users have no entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingUsername,
    AwaitingCreateDays { username: String },
    AwaitingRenewDays { username: String },
    AwaitingRestoreFile,
}

/// Work handed off once a flow has all of its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountJob {
    Create { username: String, days: u32 },
    Renew { username: String, days: u32 },
}

/// Result of feeding one text input to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Input rejected; the state is unchanged and the user is asked again.
    Reprompt(InputError),
    /// Move to the next state.
    Advance(SessionState),
    /// The flow is complete; the session ends and the job runs in the background.
    Dispatch(AccountJob),
    /// Input is not meaningful in this state.
    Ignore,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Password must be <b>3-20 characters</b>. Try again:")]
    UsernameLength,

    #[error("Password may only contain <b>letters (A-Z, a-z), digits (0-9), dash (-) and underscore (_)</b>. Try again:")]
    UsernameCharset,

    #[error("Duration must be a whole number <b>(1-9999)</b>. Try again:")]
    DaysOutOfRange,
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"))
}

pub fn validate_username(text: &str) -> Result<(), InputError> {
    if text.len() < USERNAME_MIN_LEN || text.len() > USERNAME_MAX_LEN {
        return Err(InputError::UsernameLength);
    }
    if !username_re().is_match(text) {
        return Err(InputError::UsernameCharset);
    }
    Ok(())
}

pub fn parse_days(text: &str) -> Result<u32, InputError> {
    match text.parse::<i64>() {
        Ok(n) if (MIN_DAYS..=MAX_DAYS).contains(&n) => Ok(n as u32),
        _ => Err(InputError::DaysOutOfRange),
    }
}

impl SessionState {
    pub fn on_text(&self, input: &str) -> Step {
        let text = input.trim();
        match self {
            SessionState::AwaitingUsername => match validate_username(text) {
                Ok(()) => Step::Advance(SessionState::AwaitingCreateDays {
                    username: text.to_string(),
                }),
                Err(e) => Step::Reprompt(e),
            },
            SessionState::AwaitingCreateDays { username } => match parse_days(text) {
                Ok(days) => Step::Dispatch(AccountJob::Create {
                    username: username.clone(),
                    days,
                }),
                Err(e) => Step::Reprompt(e),
            },
            SessionState::AwaitingRenewDays { username } => match parse_days(text) {
                Ok(days) => Step::Dispatch(AccountJob::Renew {
                    username: username.clone(),
                    days,
                }),
                Err(e) => Step::Reprompt(e),
            },
            SessionState::AwaitingRestoreFile => Step::Ignore,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub state: SessionState,
    touched: Instant,
}

impl Session {
    fn new(state: SessionState) -> Self {
        Self {
            state,
            touched: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.touched.elapsed() > ttl
    }
}

/// Mutex-guarded session map keyed by user.
pub struct SessionStore {
    ttl: Duration,
    inner: Mutex<HashMap<UserId, Session>>,
}

/// What `SessionStore::get` found for a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Idle,
    Active(SessionState),
    /// The session outlived its TTL and has been dropped.
    Expired,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user: UserId) -> Lookup {
        let mut map = self.inner.lock().await;
        match map.get(&user) {
            None => Lookup::Idle,
            Some(s) if s.is_expired(self.ttl) => {
                map.remove(&user);
                Lookup::Expired
            }
            Some(s) => Lookup::Active(s.state.clone()),
        }
    }

    /// Also sweeps sessions that expired a full TTL ago and were never looked
    /// up again; those users see a plain idle state when they return.
    pub async fn set(&self, user: UserId, state: SessionState) {
        let mut map = self.inner.lock().await;
        let stale = self.ttl.saturating_mul(2);
        map.retain(|_, s| !s.is_expired(stale));
        map.insert(user, Session::new(state));
    }

    /// Drop the session and any pending fields. Returns what was there.
    pub async fn clear(&self, user: UserId) -> Option<SessionState> {
        self.inner.lock().await.remove(&user).map(|s| s.state)
    }
}

/// Serializes event handling per user so transitions never interleave.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Only the map itself holds an idle entry.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_bounds_and_charset() {
        assert_eq!(validate_username("ab"), Err(InputError::UsernameLength));
        assert_eq!(
            validate_username(&"a".repeat(21)),
            Err(InputError::UsernameLength)
        );
        assert_eq!(validate_username("abc"), Ok(()));
        assert_eq!(validate_username(&"z".repeat(20)), Ok(()));
        assert_eq!(validate_username("Alice-01_x"), Ok(()));

        for bad in ["ali ce", "alice!", "al.ce", "al/ce", "ålice", "al\tce"] {
            assert!(validate_username(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn days_range() {
        assert_eq!(parse_days("1"), Ok(1));
        assert_eq!(parse_days("9999"), Ok(9999));
        for bad in ["0", "10000", "-5", "abc", "", "3.5", "99999999999999999999"] {
            assert_eq!(parse_days(bad), Err(InputError::DaysOutOfRange), "{bad:?}");
        }
    }

    #[test]
    fn create_flow_advances_then_dispatches() {
        let step = SessionState::AwaitingUsername.on_text("  alice_01 ");
        let Step::Advance(next) = step else {
            panic!("expected advance, got {step:?}");
        };
        assert_eq!(
            next,
            SessionState::AwaitingCreateDays {
                username: "alice_01".to_string()
            }
        );

        assert_eq!(
            next.on_text("30"),
            Step::Dispatch(AccountJob::Create {
                username: "alice_01".to_string(),
                days: 30
            })
        );
    }

    #[test]
    fn invalid_input_reprompts() {
        assert_eq!(
            SessionState::AwaitingUsername.on_text("a!"),
            Step::Reprompt(InputError::UsernameLength)
        );
        let renew = SessionState::AwaitingRenewDays {
            username: "bob".to_string(),
        };
        assert_eq!(
            renew.on_text("0"),
            Step::Reprompt(InputError::DaysOutOfRange)
        );
    }

    #[test]
    fn restore_state_ignores_text() {
        assert_eq!(
            SessionState::AwaitingRestoreFile.on_text("hello"),
            Step::Ignore
        );
    }

    #[tokio::test]
    async fn clear_discards_fields_from_any_state() {
        let store = SessionStore::new(Duration::from_secs(60));
        let user = UserId(9);
        for state in [
            SessionState::AwaitingUsername,
            SessionState::AwaitingCreateDays {
                username: "alice".to_string(),
            },
            SessionState::AwaitingRenewDays {
                username: "bob".to_string(),
            },
            SessionState::AwaitingRestoreFile,
        ] {
            store.set(user, state.clone()).await;
            assert_eq!(store.get(user).await, Lookup::Active(state.clone()));
            assert_eq!(store.clear(user).await, Some(state));
            assert_eq!(store.get(user).await, Lookup::Idle);
        }
    }

    #[tokio::test]
    async fn stale_session_reports_expired_once() {
        let store = SessionStore::new(Duration::from_millis(10));
        let user = UserId(1);
        store.set(user, SessionState::AwaitingUsername).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get(user).await, Lookup::Expired);
        assert_eq!(store.get(user).await, Lookup::Idle);
    }

    #[tokio::test]
    async fn abandoned_sessions_are_swept_on_set() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.set(UserId(1), SessionState::AwaitingUsername).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.set(UserId(2), SessionState::AwaitingRestoreFile).await;
        assert_eq!(store.inner.lock().await.len(), 1);
        assert_eq!(store.get(UserId(1)).await, Lookup::Idle);
    }

    #[tokio::test]
    async fn released_user_locks_are_pruned() {
        let locks = UserLocks::default();
        let held = locks.lock_user(UserId(1)).await;
        drop(locks.lock_user(UserId(2)).await);

        // User 1 is still held, user 2 is idle.
        drop(locks.lock_user(UserId(3)).await);
        {
            let map = locks.inner.lock().await;
            assert!(map.contains_key(&UserId(1)));
            assert!(!map.contains_key(&UserId(2)));
        }

        drop(held);
        drop(locks.lock_user(UserId(3)).await);
        assert_eq!(locks.inner.lock().await.len(), 1);
    }
}
