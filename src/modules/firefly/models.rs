use serde::{Deserialize, Serialize};

/// IMS token 响应
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// 秒
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// 生成请求体
#[derive(Debug, Serialize)]
pub struct GenerateRequestBody<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// 生成响应
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub outputs: Vec<GenerateOutput>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateOutput {
    #[serde(default)]
    pub image: Option<OutputImage>,
    #[serde(default)]
    pub seed: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OutputImage {
    #[serde(default)]
    pub url: Option<String>,
}
