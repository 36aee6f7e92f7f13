use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 上游调用失败的具体原因
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// 对外暴露的错误分类，每个组件只产生自己的那一类
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("auth error: {0}")]
    Auth(#[source] UpstreamError),
    #[error("generation error: {0}")]
    Generation(#[source] UpstreamError),
    #[error("download error: {0}")]
    Download(#[source] UpstreamError),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Generation,
    Download,
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "AuthError",
            ErrorKind::Generation => "GenerationError",
            ErrorKind::Download => "DownloadError",
            ErrorKind::Validation => "ValidationError",
        };
        f.write_str(name)
    }
}

impl StudioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StudioError::Auth(_) => ErrorKind::Auth,
            StudioError::Generation(_) => ErrorKind::Generation,
            StudioError::Download(_) => ErrorKind::Download,
            StudioError::Validation(_) => ErrorKind::Validation,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StudioError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
