use anyhow::Context;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppConfig;
use crate::core::{
    Credentials, DownloadedAsset, GenerationRequest, GenerationResult, Result, StudioError,
    UpstreamError,
};
use crate::modules::{AssetFetcher, CredentialProvider, GenerationClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Auth,
    Generate,
    Download,
}

impl Stage {
    fn error(self, cause: UpstreamError) -> StudioError {
        match self {
            Stage::Auth => StudioError::Auth(cause),
            Stage::Generate => StudioError::Generation(cause),
            Stage::Download => StudioError::Download(cause),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StageTimeouts {
    auth: Duration,
    generate: Duration,
    download: Duration,
}

impl StageTimeouts {
    fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Auth => self.auth,
            Stage::Generate => self.generate,
            Stage::Download => self.download,
        }
    }
}

/// 生成和下载的入口：依次调用凭证、生成、下载三个组件，不做重试
pub struct StudioService {
    credentials: Arc<Credentials>,
    provider: CredentialProvider,
    generator: GenerationClient,
    fetcher: AssetFetcher,
    downloads_dir: PathBuf,
    file_stem: String,
    timeouts: StageTimeouts,
}

impl StudioService {
    pub fn new(config: &AppConfig, credentials: Credentials) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::with_http_client(config, credentials, http))
    }

    pub fn with_http_client(
        config: &AppConfig,
        credentials: Credentials,
        http: reqwest::Client,
    ) -> Self {
        let generator =
            GenerationClient::new(http.clone(), &config.firefly, credentials.client_id.clone());
        Self {
            provider: CredentialProvider::new(http.clone(), &config.auth),
            generator,
            fetcher: AssetFetcher::new(http),
            credentials: Arc::new(credentials),
            downloads_dir: PathBuf::from(&config.downloads_dir),
            file_stem: config.download_file_stem.clone(),
            timeouts: StageTimeouts {
                auth: Duration::from_secs(config.auth.timeout_secs),
                generate: Duration::from_secs(config.firefly.timeout_secs),
                download: Duration::from_secs(config.download.timeout_secs),
            },
        }
    }

    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    pub async fn handle_generate(
        &self,
        prompt: &str,
        seed: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudioError::validation("Prompt is required"));
        }
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            seed,
        };

        let token = self
            .run_stage(
                Stage::Auth,
                cancel,
                self.provider.acquire_token(&self.credentials),
            )
            .await?;
        let result = self
            .run_stage(
                Stage::Generate,
                cancel,
                self.generator.generate(&token, &request),
            )
            .await?;

        info!("🖼️ 生成完成 (seed: {})", result.seed);
        Ok(result)
    }

    /// 返回的句柄在释放或 drop 时删除本地文件
    pub async fn handle_download(
        &self,
        image_url: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedAsset> {
        let image_url = image_url.trim();
        if image_url.is_empty() {
            return Err(StudioError::validation("Image URL is required"));
        }
        if !(image_url.starts_with("https://") || image_url.starts_with("http://")) {
            return Err(StudioError::validation("Image URL must be http(s)"));
        }

        // 每个请求独占一个文件名
        let path = self
            .downloads_dir
            .join(format!("{}-{}.png", self.file_stem, Uuid::new_v4()));
        debug!("暂存路径: {}", path.display());
        let asset = DownloadedAsset::new(path, None);

        let outcome = self
            .run_stage(
                Stage::Download,
                cancel,
                self.fetcher.fetch_to_path(image_url, asset.path()),
            )
            .await?;

        info!("📦 下载完成 ({} 字节)", outcome.bytes_written);
        Ok(asset.with_content_type(outcome.content_type))
    }

    async fn run_stage<T>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let limit = self.timeouts.for_stage(stage);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("⚠️ {:?} 阶段被取消", stage);
                Err(stage.error(UpstreamError::Cancelled))
            }
            outcome = tokio::time::timeout(limit, work) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!("⏳ {:?} 阶段超时 ({:?})", stage, limit);
                    Err(stage.error(UpstreamError::Timeout(limit)))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::utils::test_support::should_skip_httpmock;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };

    fn credentials() -> Credentials {
        Credentials {
            client_id: "test-client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn config_for(base_url: &str, downloads_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.token_url = format!("{}/ims/token/v3", base_url);
        config.firefly.generate_url = format!("{}/v3/images/generate", base_url);
        config.downloads_dir = downloads_dir.display().to_string();
        config
    }

    async fn mock_token(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ims/token/v3");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"access_token":"tok-123","token_type":"bearer","expires_in":86399}"#);
            })
            .await;
    }

    #[tokio::test]
    async fn empty_prompt_fails_before_any_network_call() {
        let dir = tempfile::tempdir().unwrap();
        // 端口 1 不可达：如果发出了请求，会得到 Auth 错误而不是 Validation
        let service = StudioService::with_http_client(
            &config_for("http://127.0.0.1:1", dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let cancel = CancellationToken::new();

        for prompt in ["", "   ", "\n\t"] {
            let err = service
                .handle_generate(prompt, None, &cancel)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let err = service.handle_download("", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = service
            .handle_download("file:///etc/passwd", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn generate_sequences_token_then_generation() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        let generate = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v3/images/generate")
                    .header("authorization", "Bearer tok-123")
                    .body_includes(r#""prompt":"a red bicycle on a beach""#);
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"outputs":[{"seed":31337,"image":{"url":"https://cdn.example/bike.png"}}]}"#);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = StudioService::with_http_client(
            &config_for(&server.base_url(), dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let result = service
            .handle_generate("  a red bicycle on a beach ", None, &CancellationToken::new())
            .await
            .unwrap();
        generate.assert_async().await;

        assert!(!result.image_url.is_empty());
        assert_eq!(result.seed, 31337);
    }

    #[tokio::test]
    async fn auth_failure_stops_the_pipeline() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/ims/token/v3");
                then.status(400).body(r#"{"error":"invalid_scope"}"#);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = StudioService::with_http_client(
            &config_for(&server.base_url(), dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let err = service
            .handle_generate("a cat", Some(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn cancelled_request_reports_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let service = StudioService::with_http_client(
            &config_for("http://127.0.0.1:1", dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .handle_generate("a cat", None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Auth(UpstreamError::Cancelled)));
    }

    #[tokio::test]
    async fn hung_download_times_out() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.png");
                then.status(200)
                    .delay(Duration::from_secs(5))
                    .body("late");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&server.base_url(), dir.path());
        config.download.timeout_secs = 1;
        let service =
            StudioService::with_http_client(&config, credentials(), reqwest::Client::new());

        let err = service
            .handle_download(&server.url("/slow.png"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Download(UpstreamError::Timeout(_))));
        // 失败时不留下暂存文件
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    async fn mock_slow_generation(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v3/images/generate");
                then.status(200)
                    .header("content-type", "application/json")
                    .delay(Duration::from_secs(5))
                    .body(r#"{"outputs":[{"seed":1,"image":{"url":"https://cdn.example/late.png"}}]}"#);
            })
            .await;
    }

    #[tokio::test]
    async fn hung_generation_times_out() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_slow_generation(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&server.base_url(), dir.path());
        config.firefly.timeout_secs = 1;
        let service =
            StudioService::with_http_client(&config, credentials(), reqwest::Client::new());

        let err = service
            .handle_generate("a cat", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Generation(UpstreamError::Timeout(_))));
    }

    #[tokio::test]
    async fn shutdown_aborts_in_flight_generation() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_slow_generation(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let service = StudioService::with_http_client(
            &config_for(&server.base_url(), dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let root = CancellationToken::new();
        let request = root.child_token();

        let canceller = {
            let root = root.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                root.cancel();
            })
        };
        let started = std::time::Instant::now();
        let err = service
            .handle_generate("a cat", None, &request)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, StudioError::Generation(UpstreamError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn concurrent_downloads_do_not_share_a_path() {
        if should_skip_httpmock() {
            return;
        }
        let server = MockServer::start_async().await;
        let first_body: Vec<u8> = (0..200_000u32).map(|i| (i % 7) as u8).collect();
        let second_body: Vec<u8> = (0..150_000u32).map(|i| (i % 13 + 100) as u8).collect();
        let (served_first, served_second) = (first_body.clone(), second_body.clone());
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/one.png");
                then.status(200)
                    .header("content-type", "image/png")
                    .body(served_first);
            })
            .await;
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/two.png");
                then.status(200)
                    .header("content-type", "image/png")
                    .body(served_second);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = StudioService::with_http_client(
            &config_for(&server.base_url(), dir.path()),
            credentials(),
            reqwest::Client::new(),
        );
        let cancel = CancellationToken::new();
        let (one_url, two_url) = (server.url("/one.png"), server.url("/two.png"));

        let (one, two) = tokio::join!(
            service.handle_download(&one_url, &cancel),
            service.handle_download(&two_url, &cancel),
        );
        let (one, two) = (one.unwrap(), two.unwrap());

        assert_ne!(one.path(), two.path());
        assert_eq!(std::fs::read(one.path()).unwrap(), first_body);
        assert_eq!(std::fs::read(two.path()).unwrap(), second_body);
        assert_eq!(one.content_type(), Some("image/png"));

        let (one_path, two_path) = (one.path().to_path_buf(), two.path().to_path_buf());
        one.release().await.unwrap();
        // 一个请求的清理不影响另一个
        assert!(!one_path.exists());
        assert_eq!(std::fs::read(&two_path).unwrap(), second_body);
        drop(two);
        assert!(!two_path.exists());
    }
}
