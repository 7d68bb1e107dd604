use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Body of create/renew requests. The account's password doubles as its name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountRequest {
    pub password: String,
    pub days: u32,
}

/// Snapshot of a remote account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub expired: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ip_limit: i64,
}

/// Whatever the API reports about the host; rendered as key/value pairs.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SystemInfo {
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Decoded `{success, data?, message?}` envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiReply<T> {
    Success(T),
    Failure { message: Option<String> },
}

/// Decode the envelope once at the client boundary.
///
/// A missing `success` flag, or a success whose `data` does not fit `T`, is an
/// invalid response. A missing `data` is accepted only when `T` decodes from
/// `null` (e.g. `()`).
pub fn decode_reply<T: DeserializeOwned>(raw: serde_json::Value) -> Result<ApiReply<T>> {
    let Some(success) = raw.get("success").and_then(|v| v.as_bool()) else {
        return Err(Error::InvalidResponse(
            "missing boolean `success` field".to_string(),
        ));
    };

    if !success {
        let message = raw
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string());
        return Ok(ApiReply::Failure { message });
    }

    let data = raw.get("data").cloned().unwrap_or(serde_json::Value::Null);
    serde_json::from_value::<T>(data)
        .map(ApiReply::Success)
        .map_err(|e| Error::InvalidResponse(format!("unexpected `data`: {e}")))
}
