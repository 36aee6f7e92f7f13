use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 客户端凭证，启动时加载一次，之后只读
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// 短期 bearer token
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn authorization_header_value(&self) -> String {
        format!("{} {}", self.token_type, self.value)
    }

    /// 距离过期还有超过 `margin` 的时间才算可复用；没有过期时间的 token 不复用
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            // 溢出视为已过期
            Some(expires_at) => now
                .checked_add_signed(margin)
                .is_some_and(|deadline| deadline < expires_at),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image_url: String,
    pub seed: i64,
}

/// 下载到本地暂存目录的图片，句柄释放时删除文件
#[derive(Debug)]
pub struct DownloadedAsset {
    path: PathBuf,
    content_type: Option<String>,
    released: bool,
}

impl DownloadedAsset {
    pub fn new(path: PathBuf, content_type: Option<String>) -> Self {
        Self {
            path,
            content_type,
            released: false,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// 给用户的文件扩展名，优先按 content-type 判断
    pub fn extension(&self) -> &str {
        let by_mime = self.content_type().and_then(|mime| {
            match mime.split(';').next().map(str::trim) {
                Some("image/jpeg") | Some("image/jpg") => Some("jpg"),
                Some("image/webp") => Some("webp"),
                Some("image/png") => Some("png"),
                _ => None,
            }
        });
        by_mime
            .or_else(|| self.path.extension().and_then(|ext| ext.to_str()))
            .unwrap_or("png")
    }

    /// 显式删除本地文件
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("已删除暂存文件: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// 兜底路径：正常流程走 `release`，这里只同步删除单个文件
impl Drop for DownloadedAsset {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("已删除暂存文件: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除暂存文件失败 {}: {}", self.path.display(), e),
        }
    }
}
