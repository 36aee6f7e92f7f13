use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use futures::{StreamExt, future};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::core::StudioError;
use crate::utils::text::parse_seed;
use crate::web::WebState;
use crate::web::pages::{index_page, result_page};

const STYLESHEET: &str = include_str!("style.css");

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub prompt: Option<String>,
    pub seed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

/// 校验失败返回 400 和原因，其余一律返回不透明的 500
fn failure(err: StudioError, opaque: &'static str) -> Response {
    match &err {
        StudioError::Validation(message) => {
            warn!("请求参数不合法: {}", message);
            (StatusCode::BAD_REQUEST, message.clone()).into_response()
        }
        _ => {
            error!("❌ [{}] {}", err.kind(), err);
            (StatusCode::INTERNAL_SERVER_ERROR, opaque).into_response()
        }
    }
}

pub async fn index(Query(query): Query<IndexQuery>) -> Html<String> {
    Html(index_page(query.prompt.as_deref().unwrap_or_default()))
}

pub async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], STYLESHEET)
}

pub async fn generate_get(
    State(state): State<WebState>,
    Query(query): Query<GenerateQuery>,
) -> Response {
    render_generation(&state, query.prompt.unwrap_or_default(), query.seed).await
}

/// 表单上传：参考图只接收，不转发给生成接口
pub async fn generate_post(State(state): State<WebState>, mut multipart: Multipart) -> Response {
    let mut prompt = String::new();
    let mut seed = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("解析表单失败: {}", e);
                return (StatusCode::BAD_REQUEST, "Invalid form data").into_response();
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" | "seed" => {
                let value = match field.text().await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("读取表单字段 {} 失败: {}", name, e);
                        return (StatusCode::BAD_REQUEST, "Invalid form data").into_response();
                    }
                };
                if name == "prompt" {
                    prompt = value;
                } else {
                    seed = Some(value);
                }
            }
            "reference_image" => {
                let file_name = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) if !bytes.is_empty() => {
                        info!(
                            "收到参考图 {:?} ({} 字节)，当前不会转发",
                            file_name,
                            bytes.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("读取参考图失败: {}", e);
                        return (StatusCode::BAD_REQUEST, "Invalid form data").into_response();
                    }
                }
            }
            other => debug!("忽略表单字段: {}", other),
        }
    }

    render_generation(&state, prompt, seed).await
}

async fn render_generation(state: &WebState, prompt: String, seed: Option<String>) -> Response {
    let seed = match parse_seed(seed.as_deref()) {
        Ok(seed) => seed,
        Err(message) => return failure(StudioError::validation(message), "Error generating image"),
    };

    // 服务关闭时取消进行中的上游调用
    let cancel = state.shutdown.child_token();
    match state.service.handle_generate(&prompt, seed, &cancel).await {
        Ok(result) => Html(result_page(prompt.trim(), &result)).into_response(),
        Err(err) => failure(err, "Error generating image"),
    }
}

pub async fn download(
    State(state): State<WebState>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let cancel = state.shutdown.child_token();
    let image_url = query.image_url.unwrap_or_default();
    let asset = match state.service.handle_download(&image_url, &cancel).await {
        Ok(asset) => asset,
        Err(err) => return failure(err, "Error downloading image"),
    };

    let file = match tokio::fs::File::open(asset.path()).await {
        Ok(file) => file,
        Err(e) => {
            error!("❌ 打开暂存文件失败 {}: {}", asset.path().display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error downloading image").into_response();
        }
    };

    let content_type = asset.content_type().unwrap_or("image/png").to_string();
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        state.service.file_stem(),
        asset.extension()
    );
    // 文件发送完毕后异步删除；响应中断时由 asset 的 Drop 兜底
    let cleanup = futures::stream::once(async move {
        if let Err(e) = asset.release().await {
            warn!("删除暂存文件失败: {}", e);
        }
        None::<std::io::Result<Bytes>>
    })
    .filter_map(future::ready);
    let body = Body::from_stream(ReaderStream::new(file).chain(cleanup));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}
