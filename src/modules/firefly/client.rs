use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::app::config::FireflyConfig;
use crate::core::{
    AccessToken, GenerationRequest, GenerationResult, Result, StudioError, UpstreamError,
};
use crate::modules::firefly::models::{GenerateRequestBody, GenerateResponse};
use crate::utils::http::read_checked_json;

/// Firefly 文生图接口客户端
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    generate_url: String,
    api_key: String,
}

impl GenerationClient {
    /// `api_key` 即 client id
    pub fn new(http: reqwest::Client, config: &FireflyConfig, api_key: impl Into<String>) -> Self {
        Self {
            http,
            generate_url: config.generate_url.clone(),
            api_key: api_key.into(),
        }
    }

    pub async fn generate(
        &self,
        token: &AccessToken,
        request: &GenerationRequest,
    ) -> Result<GenerationResult> {
        self.send(token, request)
            .await
            .map_err(StudioError::Generation)
    }

    async fn send(
        &self,
        token: &AccessToken,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationResult, UpstreamError> {
        let body = GenerateRequestBody {
            prompt: &request.prompt,
            seed: request.seed,
        };
        info!("🎨 正在请求生成图片 (seed: {:?})", request.seed);
        debug!("生成请求体: {}", serde_json::to_string(&body).unwrap_or_default());

        let response = self
            .http
            .post(&self.generate_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header("x-api-key", &self.api_key)
            .header(AUTHORIZATION, token.authorization_header_value())
            .json(&body)
            .send()
            .await?;

        let parsed: GenerateResponse = read_checked_json(response).await.map_err(|e| {
            warn!("❌ 生成接口返回错误: {}", e);
            e
        })?;
        let result = extract_first_output(parsed, request.seed)?;
        info!("✅ 图片生成成功，seed: {}", result.seed);
        debug!("图片地址: {}", result.image_url);
        Ok(result)
    }
}

/// 只取第一个输出；响应里没有 seed 时退回到请求时给的 seed
fn extract_first_output(
    response: GenerateResponse,
    requested_seed: Option<i64>,
) -> std::result::Result<GenerationResult, UpstreamError> {
    let first = response
        .outputs
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::InvalidResponse("response has no outputs".to_string()))?;

    let image_url = first
        .image
        .and_then(|image| image.url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            UpstreamError::InvalidResponse("first output has no image url".to_string())
        })?;

    let seed = first
        .seed
        .or(requested_seed)
        .ok_or_else(|| UpstreamError::InvalidResponse("first output has no seed".to_string()))?;

    Ok(GenerationResult { image_url, seed })
}
