use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::core::Credentials;

pub const CLIENT_ID_ENV: &str = "FIREFLY_SERVICES_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "FIREFLY_SERVICES_CLIENT_SECRET";
pub const CONFIG_PATH_ENV: &str = "FIREFLY_STUDIO_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,
    #[serde(default = "default_download_file_stem")]
    pub download_file_stem: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub firefly: FireflyConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// 身份服务（IMS）相关配置
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub cache_token: bool,
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FireflyConfig {
    #[serde(default = "default_generate_url")]
    pub generate_url: String,
    #[serde(default = "default_generate_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    #[serde(default = "default_download_timeout_secs")]
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path.unwrap_or_else(|| Path::new("config.toml"));
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
            return Self::from_toml(&raw)
                .with_context(|| format!("解析配置文件失败: {}", path.display()));
        }
        Ok(AppConfig::default())
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// 从环境变量读取凭证，任一缺失即失败
pub fn load_credentials() -> Result<Credentials> {
    credentials_from(|key| std::env::var(key).ok())
}

pub fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("缺少环境变量 {}", key))
    };
    Ok(Credentials {
        client_id: read(CLIENT_ID_ENV)?,
        client_secret: read(CLIENT_SECRET_ENV)?,
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            downloads_dir: default_downloads_dir(),
            download_file_stem: default_download_file_stem(),
            max_upload_bytes: default_max_upload_bytes(),
            auth: AuthConfig::default(),
            firefly: FireflyConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            scope: default_scope(),
            timeout_secs: default_auth_timeout_secs(),
            cache_token: false,
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

impl Default for FireflyConfig {
    fn default() -> Self {
        Self {
            generate_url: default_generate_url(),
            timeout_secs: default_generate_timeout_secs(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_downloads_dir() -> String {
    "downloads".to_string()
}

fn default_download_file_stem() -> String {
    "firefly_image".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_token_url() -> String {
    "https://ims-na1.adobelogin.com/ims/token/v3".to_string()
}

fn default_scope() -> String {
    "openid,AdobeID,session,additional_info,read_organizations,firefly_api,ff_apis".to_string()
}

fn default_auth_timeout_secs() -> u64 {
    30
}

fn default_refresh_margin_secs() -> i64 {
    60
}

fn default_generate_url() -> String {
    "https://firefly-api.adobe.io/v3/images/generate".to_string()
}

fn default_generate_timeout_secs() -> u64 {
    120
}

fn default_download_timeout_secs() -> u64 {
    120
}
