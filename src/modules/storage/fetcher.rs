use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::{Result, StudioError, UpstreamError};
use crate::utils::text::truncate_text;

/// 一次下载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes_written: u64,
    pub content_type: Option<String>,
}

/// 把远程图片流式写入本地文件，不负责清理
#[derive(Clone)]
pub struct AssetFetcher {
    http: reqwest::Client,
}

fn download_err(e: impl Into<UpstreamError>) -> StudioError {
    StudioError::Download(e.into())
}

impl AssetFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// 已存在的文件会被覆盖
    pub async fn fetch_to_path(&self, url: &str, destination: &Path) -> Result<FetchOutcome> {
        info!("⬇️ 正在下载图片到 {}", destination.display());
        let response = self.http.get(url).send().await.map_err(download_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(download_err(UpstreamError::Api {
                status,
                body: truncate_text(&body, 512),
            }));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(download_err)?;
        }
        let mut file = fs::File::create(destination).await.map_err(download_err)?;

        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(download_err)?;
            file.write_all(&chunk).await.map_err(download_err)?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(download_err)?;

        debug!("写入 {} 字节, content-type: {:?}", bytes_written, content_type);
        Ok(FetchOutcome {
            bytes_written,
            content_type,
        })
    }
}
