use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error};

use crate::{
    api::{
        types::{decode_reply, AccountRecord, AccountRequest, ApiReply, SystemInfo},
        ProvisioningApi,
    },
    config::ApiSettings,
    errors::Error,
    Result,
};

/// JSON-over-HTTP client for the provisioning service.
///
/// Every request carries `X-API-Key`; there are no retries.
#[derive(Clone, Debug)]
pub struct HttpApiClient {
    settings: ApiSettings,
    http: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { settings, http })
    }

    /// Issue one request and decode the body into a generic JSON value.
    ///
    /// Non-200 responses are errors that carry the response body.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let Some(key) = self.settings.api_key.as_deref() else {
            return Err(Error::Config(format!(
                "api key not loaded, check {}",
                self.settings.key_path.display()
            )));
        };

        let url = format!("{}{path}", self.settings.base_url);
        debug!(method = %method, url = %url, "api request");

        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Content-Type", "application/json")
            .header("X-API-Key", key);
        if let Some(body) = payload {
            req = req.body(serde_json::to_vec(body)?);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Api(format!("{method} {path} timed out: {e}"))
            } else {
                Error::Api(format!("{method} {path} request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "{method} {path} returned status {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Api(format!("{method} {path} body read failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidResponse(format!("{method} {path}: {e}")))
    }

    async fn call_reply<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<ApiReply<T>> {
        let raw = self
            .call(method, path, payload.as_ref())
            .await
            .inspect_err(|e| error!(endpoint = path, error = %e, "api call failed"))?;
        decode_reply(raw).inspect_err(|e| error!(endpoint = path, error = %e, "bad api reply"))
    }
}

#[async_trait]
impl ProvisioningApi for HttpApiClient {
    async fn create_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>> {
        self.call_reply(Method::POST, "/user/create", Some(serde_json::to_value(req)?))
            .await
    }

    async fn renew_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>> {
        self.call_reply(Method::POST, "/user/renew", Some(serde_json::to_value(req)?))
            .await
    }

    async fn delete_account(&self, password: &str) -> Result<ApiReply<()>> {
        self.call_reply(
            Method::POST,
            "/user/delete",
            Some(json!({ "password": password })),
        )
        .await
    }

    async fn list_accounts(&self) -> Result<ApiReply<Vec<AccountRecord>>> {
        self.call_reply(Method::GET, "/users", None).await
    }

    async fn system_info(&self) -> Result<ApiReply<SystemInfo>> {
        self.call_reply(Method::GET, "/info", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn settings(base_url: String, key: Option<&str>, timeout: Duration) -> ApiSettings {
        ApiSettings {
            base_url,
            api_key: key.map(|k| k.to_string()),
            key_path: "/etc/zivpn/apikey".into(),
            timeout,
        }
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let content_len = text[..head_end]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve exactly one canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            let resp = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            let _ = tx.send(request);
        });
        (format!("http://{addr}/api"), rx)
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        // Port 9 (discard) would fail loudly if a request were attempted.
        let client = HttpApiClient::new(settings(
            "http://127.0.0.1:9/api".to_string(),
            None,
            Duration::from_secs(1),
        ))
        .unwrap();

        let err = client.list_accounts().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn create_sends_key_and_payload() {
        let (url, request) = serve_once(
            "200 OK",
            r#"{"success":true,"data":{"password":"alice_01","expired":"2026-11-18"}}"#,
        )
        .await;
        let client =
            HttpApiClient::new(settings(url, Some("k3y"), Duration::from_secs(5))).unwrap();

        let reply = client
            .create_account(&AccountRequest {
                password: "alice_01".to_string(),
                days: 30,
            })
            .await
            .unwrap();
        let ApiReply::Success(rec) = reply else {
            panic!("expected success");
        };
        assert_eq!(rec.expired, "2026-11-18");

        let raw = request.await.unwrap();
        let lower = raw.to_lowercase();
        assert!(raw.starts_with("POST /api/user/create "));
        assert!(lower.contains("x-api-key: k3y"));
        let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent, json!({"password": "alice_01", "days": 30}));
    }

    #[tokio::test]
    async fn non_200_is_an_error_with_body() {
        let (url, _request) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let client =
            HttpApiClient::new(settings(url, Some("k"), Duration::from_secs(5))).unwrap();

        let err = client.system_info().await.unwrap_err();
        let Error::Api(msg) = err else {
            panic!("expected api error, got {err:?}");
        };
        assert!(msg.contains("500"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_response() {
        let (url, _request) = serve_once("200 OK", "not json").await;
        let client =
            HttpApiClient::new(settings(url, Some("k"), Duration::from_secs(5))).unwrap();

        let err = client.list_accounts().await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut sock).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = HttpApiClient::new(settings(
            format!("http://{addr}/api"),
            Some("k"),
            Duration::from_millis(200),
        ))
        .unwrap();

        let err = client.list_accounts().await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }
}
