use serde::de::DeserializeOwned;

use crate::core::UpstreamError;
use crate::utils::text::truncate_text;

const ERROR_BODY_MAX_CHARS: usize = 512;

/// 检查状态码并把响应体解析为 JSON
pub async fn read_checked_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Api {
            status,
            body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
        });
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| UpstreamError::InvalidResponse(format!("failed to parse json: {}", e)))
}
