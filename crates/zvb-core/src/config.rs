use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{domain::UserId, errors::Error, restart::RestartPlan, Result};

pub const DEFAULT_CONFIG_DIR: &str = "/etc/zivpn";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";

pub const BOT_CONFIG_FILE: &str = "bot-config.json";
pub const API_KEY_FILE: &str = "apikey";
pub const API_PORT_FILE: &str = "api_port";
pub const DOMAIN_FILE: &str = "domain";
pub const SERVICE_CONFIG_FILE: &str = "config.json";
pub const USERS_FILE: &str = "users.json";

/// Locations of the flat configuration files under one directory.
#[derive(Clone, Debug)]
pub struct ConfigPaths {
    pub dir: PathBuf,
}

impl ConfigPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn bot_config(&self) -> PathBuf {
        self.dir.join(BOT_CONFIG_FILE)
    }

    pub fn api_key(&self) -> PathBuf {
        self.dir.join(API_KEY_FILE)
    }

    pub fn api_port(&self) -> PathBuf {
        self.dir.join(API_PORT_FILE)
    }

    pub fn domain(&self) -> PathBuf {
        self.dir.join(DOMAIN_FILE)
    }

    pub fn service_config(&self) -> PathBuf {
        self.dir.join(SERVICE_CONFIG_FILE)
    }

    pub fn users(&self) -> PathBuf {
        self.dir.join(USERS_FILE)
    }

    /// Files included in a backup, in archive order.
    pub fn backup_sources(&self) -> Vec<PathBuf> {
        vec![
            self.service_config(),
            self.users(),
            self.domain(),
            self.bot_config(),
            self.api_key(),
            self.api_port(),
        ]
    }
}

/// Who may talk to the bot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccessMode {
    Public,
    #[default]
    Private,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::Public => "public",
            AccessMode::Private => "private",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AccessMode::Public => AccessMode::Private,
            AccessMode::Private => AccessMode::Public,
        }
    }
}

impl From<String> for AccessMode {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("public") {
            AccessMode::Public
        } else {
            AccessMode::Private
        }
    }
}

impl From<AccessMode> for String {
    fn from(m: AccessMode) -> Self {
        m.as_str().to_string()
    }
}

/// Contents of `bot-config.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_token: String,
    pub admin_id: i64,
    #[serde(default)]
    pub mode: AccessMode,
    #[serde(default)]
    pub domain: String,
}

impl BotConfig {
    /// Read the bot settings; an empty domain falls back to the `domain` file.
    pub fn load(paths: &ConfigPaths) -> Result<Self> {
        let path = paths.bot_config();
        let raw = fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut cfg: BotConfig = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        if cfg.domain.trim().is_empty() {
            cfg.domain = read_trimmed(&paths.domain()).unwrap_or_default();
        }

        Ok(cfg)
    }

    pub fn save(&self, paths: &ConfigPaths) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(paths.bot_config(), data)?;
        Ok(())
    }

    pub fn admin(&self) -> UserId {
        UserId(self.admin_id)
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.mode == AccessMode::Public || user == self.admin()
    }
}

/// How to reach the provisioning API.
#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub key_path: PathBuf,
    pub timeout: Duration,
}

impl ApiSettings {
    /// Missing or malformed files degrade to defaults with a warning.
    pub fn load(paths: &ConfigPaths, timeout: Duration) -> Self {
        let key_path = paths.api_key();
        let api_key = match fs::read_to_string(&key_path) {
            Ok(raw) => {
                let key = raw.trim().to_string();
                if key.is_empty() {
                    warn!(path = %key_path.display(), "api key file is empty");
                    None
                } else {
                    info!("api key loaded");
                    Some(key)
                }
            }
            Err(e) => {
                warn!(path = %key_path.display(), error = %e, "failed to read api key");
                None
            }
        };

        let port_path = paths.api_port();
        let base_url = match fs::read_to_string(&port_path) {
            Ok(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => {
                    let url = format!("http://127.0.0.1:{port}/api");
                    info!(url = %url, "api url configured");
                    url
                }
                Err(e) => {
                    warn!(error = %e, fallback = DEFAULT_API_URL, "invalid api port");
                    DEFAULT_API_URL.to_string()
                }
            },
            Err(e) => {
                warn!(
                    path = %port_path.display(),
                    error = %e,
                    fallback = DEFAULT_API_URL,
                    "failed to read api port"
                );
                DEFAULT_API_URL.to_string()
            }
        };

        Self {
            base_url,
            api_key,
            key_path,
            timeout,
        }
    }
}

/// Typed runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub paths: ConfigPaths,
    pub bot: BotConfig,
    pub api: ApiSettings,

    pub temp_dir: PathBuf,
    pub session_ttl: Duration,
    pub page_size: usize,
    pub max_jobs: usize,
    pub max_upload_bytes: u64,
    pub ip_lookup_url: String,
    pub restart: RestartPlan,
}

impl Config {
    /// Load everything from the environment and the config directory.
    ///
    /// A missing bot token is the only hard failure.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let dir = env_path("ZIVPN_CONFIG_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
        let mut cfg = Self::from_paths(ConfigPaths::new(dir))?;

        if let Some(dir) = env_path("ZIVPN_TEMP_DIR") {
            cfg.temp_dir = dir;
        }
        if let Some(secs) = env_u64("ZIVPN_API_TIMEOUT_SECS") {
            cfg.api.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_u64("ZIVPN_SESSION_TTL_SECS") {
            cfg.session_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_usize("ZIVPN_PAGE_SIZE") {
            cfg.page_size = n.clamp(1, 50);
        }
        if let Some(n) = env_usize("ZIVPN_MAX_JOBS") {
            cfg.max_jobs = n.max(1);
        }
        if let Some(secs) = env_u64("ZIVPN_RESTART_TIMEOUT_SECS") {
            cfg.restart.readiness_timeout = Duration::from_secs(secs);
        }

        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from the files under `paths` with built-in defaults.
    pub fn from_paths(paths: ConfigPaths) -> Result<Self> {
        let bot = BotConfig::load(&paths)?;
        if bot.bot_token.trim().is_empty() {
            return Err(Error::Config(format!(
                "bot_token is missing in {}",
                paths.bot_config().display()
            )));
        }

        let api = ApiSettings::load(&paths, Duration::from_secs(10));

        Ok(Self {
            paths,
            bot,
            api,
            temp_dir: env::temp_dir(),
            session_ttl: Duration::from_secs(600),
            page_size: 10,
            max_jobs: 8,
            max_upload_bytes: 20 * 1024 * 1024,
            ip_lookup_url: "http://ip-api.com/json/".to_string(),
            restart: RestartPlan::default(),
        })
    }
}

/// Read a small text file and trim it; empty contents count as absent.
pub fn read_trimmed(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let s = raw.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}
