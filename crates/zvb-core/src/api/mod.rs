//! Provisioning API client and the server geolocation lookup.

pub mod client;
pub mod locate;
pub mod types;

use async_trait::async_trait;

use crate::Result;

pub use client::HttpApiClient;
pub use types::{AccountRecord, AccountRequest, ApiReply, SystemInfo};

/// Port for the remote service that owns VPN accounts.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn create_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>>;
    async fn renew_account(&self, req: &AccountRequest) -> Result<ApiReply<AccountRecord>>;
    async fn delete_account(&self, password: &str) -> Result<ApiReply<()>>;
    async fn list_accounts(&self) -> Result<ApiReply<Vec<AccountRecord>>>;
    async fn system_info(&self) -> Result<ApiReply<SystemInfo>>;
}
