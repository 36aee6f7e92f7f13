mod app;
mod core;
mod logger;
mod modules;
mod services;
mod utils;
mod web;

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::AppConfig;
use crate::app::config::{CONFIG_PATH_ENV, load_credentials};
use crate::services::StudioService;
use crate::web::WebState;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();

    let config_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let app_config = AppConfig::load(config_path.as_deref())?;
    let credentials = load_credentials().context("无法加载 Firefly 凭证")?;

    // 确保暂存目录存在
    fs::create_dir_all(&app_config.downloads_dir)
        .with_context(|| format!("创建目录失败: {}", app_config.downloads_dir))?;

    let service = StudioService::new(&app_config, credentials)?;
    let shutdown = CancellationToken::new();
    let state = WebState {
        service: Arc::new(service),
        shutdown: shutdown.clone(),
    };
    let app = web::router(state, app_config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&app_config.listen_addr)
        .await
        .with_context(|| format!("监听地址失败: {}", app_config.listen_addr))?;
    info!("🚀 服务已启动: http://{}", listener.local_addr()?);
    if app_config.auth.cache_token {
        info!("🔑 已启用 token 缓存");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    info!("👋 服务已停止");
    Ok(())
}

/// 收到 Ctrl-C 后取消根令牌，进行中的上游调用随之中止
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 收到退出信号，正在关闭...");
    shutdown.cancel();
}
