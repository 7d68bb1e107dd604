//! Hand-written port fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;

use crate::{
    api::{
        locate::{IpInfo, ServerLocator},
        AccountRecord, AccountRequest, ApiReply, ProvisioningApi, SystemInfo,
    },
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    restart::ServiceManager,
    Result,
};

/// Fresh directory under the system temp dir, unique per call.
pub fn tmp_dir(prefix: &str) -> PathBuf {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!(
        "zvb-{prefix}-{}-{nanos}-{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

// ============== Messenger ==============

#[derive(Clone, Debug)]
pub struct SentDocument {
    pub chat_id: ChatId,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: String,
    pub path: PathBuf,
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<String>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    deleted: Mutex<Vec<MessageRef>>,
    documents: Mutex<Vec<SentDocument>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(1000 + *guard),
        }
    }

    pub fn put_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    pub fn sent_html(&self) -> Vec<String> {
        self.sends.lock().unwrap().clone()
    }

    pub fn keyboard_sends(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }

    pub fn last_keyboard(&self) -> Option<(String, InlineKeyboard)> {
        self.keyboards
            .lock()
            .unwrap()
            .last()
            .map(|(_, text, kb)| (text.clone(), kb.clone()))
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<SentDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }

    /// Everything sent as text, with or without a keyboard.
    pub fn all_text(&self) -> String {
        let mut out = self.sent_html();
        out.extend(self.keyboard_sends().into_iter().map(|(_, t, _)| t));
        out.join("\n")
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push(html.to_string());
        Ok(self.alloc(chat_id))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, html.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageRef> {
        let bytes = fs::read(path)?;
        self.documents.lock().unwrap().push(SentDocument {
            chat_id,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            bytes,
            caption: caption.to_string(),
            path: path.to_path_buf(),
        });
        Ok(self.alloc(chat_id))
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::External(format!("no such file: {file_id}")))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

// ============== Provisioning API ==============

/// How the fake API answers account mutations.
#[derive(Clone, Debug, Default)]
pub enum Scripted {
    #[default]
    Ok,
    Failure(Option<String>),
    Transport(String),
    Invalid,
}

#[derive(Default)]
pub struct FakeApi {
    script: Mutex<Scripted>,
    accounts: Mutex<Vec<AccountRecord>>,
    requests: Mutex<Vec<(String, AccountRequest)>>,
    deleted: Mutex<Vec<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeApi {
    pub fn script(&self, s: Scripted) {
        *self.script.lock().unwrap() = s;
    }

    pub fn set_accounts(&self, names: &[&str]) {
        *self.accounts.lock().unwrap() = names
            .iter()
            .map(|n| AccountRecord {
                password: n.to_string(),
                expired: "2026-12-31".to_string(),
                status: "active".to_string(),
                ip_limit: 1,
            })
            .collect();
    }

    pub fn requests(&self) -> Vec<(String, AccountRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn answer<T>(&self, ok: impl FnOnce() -> T) -> Result<ApiReply<T>> {
        match self.script.lock().unwrap().clone() {
            Scripted::Ok => Ok(ApiReply::Success(ok())),
            Scripted::Failure(message) => Ok(ApiReply::Failure { message }),
            Scripted::Transport(e) => Err(Error::Api(e)),
            Scripted::Invalid => Err(Error::InvalidResponse("missing success".to_string())),
        }
    }

    fn mutate(&self, op: &'static str, req: &AccountRequest) -> Result<ApiReply<AccountRecord>> {
        self.calls.lock().unwrap().push(op);
        self.requests
            .lock()
            .unwrap()
            .push((op.to_string(), req.clone()));
        self.answer(|| AccountRecord {
            password: req.password.clone(),
            expired: "2026-11-18".to_string(),
            status: "active".to_string(),
            ip_limit: 0,
        })
    }
}

#[async_trait]
impl ProvisioningApi for FakeApi {
    async fn create_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>> {
        self.mutate("create", req)
    }

    async fn renew_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>> {
        self.mutate("renew", req)
    }

    async fn delete_account(&self, password: &str) -> Result<ApiReply<()>> {
        self.calls.lock().unwrap().push("delete");
        self.deleted.lock().unwrap().push(password.to_string());
        self.answer(|| ())
    }

    async fn list_accounts(&self) -> Result<ApiReply<Vec<AccountRecord>>> {
        self.calls.lock().unwrap().push("list");
        Ok(ApiReply::Success(self.accounts.lock().unwrap().clone()))
    }

    async fn system_info(&self) -> Result<ApiReply<SystemInfo>> {
        self.calls.lock().unwrap().push("info");
        let fields = [("os".to_string(), serde_json::json!("Debian 12"))]
            .into_iter()
            .collect();
        Ok(ApiReply::Success(SystemInfo { fields }))
    }
}

// ============== Service manager ==============

pub struct FakeServices {
    restarted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    /// `None` makes the readiness probe fail.
    probe: Mutex<Option<bool>>,
}

impl Default for FakeServices {
    fn default() -> Self {
        Self {
            restarted: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            probe: Mutex::new(Some(true)),
        }
    }
}

impl FakeServices {
    pub fn restarted(&self) -> Vec<String> {
        self.restarted.lock().unwrap().clone()
    }

    pub fn fail_unit(&self, unit: &str) {
        self.failing.lock().unwrap().insert(unit.to_string());
    }

    pub fn set_probe(&self, probe: Option<bool>) {
        *self.probe.lock().unwrap() = probe;
    }
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn restart(&self, unit: &str) -> Result<()> {
        self.restarted.lock().unwrap().push(unit.to_string());
        if self.failing.lock().unwrap().contains(unit) {
            return Err(Error::External(format!("{unit} failed to start")));
        }
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool> {
        match *self.probe.lock().unwrap() {
            Some(active) => Ok(active),
            None => Err(Error::External(format!("cannot query {unit}"))),
        }
    }
}

// ============== Locator ==============

pub struct FakeLocator;

#[async_trait]
impl ServerLocator for FakeLocator {
    async fn locate(&self) -> IpInfo {
        IpInfo {
            city: "Jakarta".to_string(),
            isp: "Example Net".to_string(),
            query: "203.0.113.7".to_string(),
        }
    }
}
