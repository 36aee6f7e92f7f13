use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::config::AuthConfig;
use crate::core::{AccessToken, Credentials, Result, StudioError, UpstreamError};
use crate::modules::firefly::models::TokenResponse;
use crate::utils::http::read_checked_json;

/// 用 client credentials 向 IMS 换取 bearer token
pub struct CredentialProvider {
    http: reqwest::Client,
    token_url: String,
    scope: String,
    cache: Option<TokenCache>,
}

struct TokenCache {
    slot: Mutex<Option<AccessToken>>,
    refresh_margin: Duration,
}

impl CredentialProvider {
    pub fn new(http: reqwest::Client, config: &AuthConfig) -> Self {
        let cache = config.cache_token.then(|| TokenCache {
            slot: Mutex::new(None),
            refresh_margin: Duration::try_seconds(config.refresh_margin_secs.max(0))
                .unwrap_or(Duration::MAX),
        });
        Self {
            http,
            token_url: config.token_url.clone(),
            scope: config.scope.clone(),
            cache,
        }
    }

    pub async fn acquire_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        let Some(cache) = &self.cache else {
            return self.exchange(credentials).await.map_err(StudioError::Auth);
        };

        // 持锁换取，避免并发请求同时刷新
        let mut slot = cache.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh_at(Utc::now(), cache.refresh_margin) {
                debug!("复用缓存的 access token");
                return Ok(token.clone());
            }
        }
        let token = self.exchange(credentials).await.map_err(StudioError::Auth)?;
        if token.expires_at.is_some() {
            *slot = Some(token.clone());
        } else {
            *slot = None;
        }
        Ok(token)
    }

    async fn exchange(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<AccessToken, UpstreamError> {
        info!("🔑 正在换取 access token...");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;
        let parsed: TokenResponse = read_checked_json(response).await.map_err(|e| {
            warn!("❌ 换取 token 失败: {}", e);
            e
        })?;

        let value = parsed
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                UpstreamError::InvalidResponse("token response missing access_token".to_string())
            })?;
        let token_type = parsed
            .token_type
            .filter(|value| !value.trim().is_empty())
            .map(|value| normalize_token_type(&value))
            .unwrap_or_else(|| "Bearer".to_string());
        let expires_at = match parsed.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => Some(expiry_after(secs).ok_or_else(|| {
                UpstreamError::InvalidResponse("expires_in out of range".to_string())
            })?),
            None => None,
        };

        info!("✅ access token 获取成功");
        debug!("token 过期时间: {:?}", expires_at);
        Ok(AccessToken {
            value,
            token_type,
            expires_at,
        })
    }
}

fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|ttl| Utc::now().checked_add_signed(ttl))
}

/// IMS 返回的 token_type 是小写的 "bearer"
fn normalize_token_type(raw: &str) -> String {
    if raw.eq_ignore_ascii_case("bearer") {
        "Bearer".to_string()
    } else {
        raw.to_string()
    }
}
