use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use qa_answer::AnswerService;
use qa_auth::{CallerIdentity, PolicyGate};
use qa_core::{AnswerRequest, AnswerResponse};
use qa_error::{ErrorMetadataBuilder, QaError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: AnswerService,
    pub gate: Arc<PolicyGate>,
    pub public_base_url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/answer", post(answer))
        .route("/api/v1/answer", post(answer))
        .route("/api/v1/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn answer(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, QaError> {
    req.validate()?;
    let resolved = req.resolve();

    let caller = CallerIdentity::from_headers(&headers, connect.map(|ConnectInfo(addr)| addr.ip()));
    let access = state.gate.evaluate(&caller).await;
    let base_url = base_url(&headers, state.public_base_url.as_deref());

    match state.service.answer(&resolved, &base_url, access).await {
        Ok(resp) => {
            info!(
                retrieved = resp.retrieved.len(),
                citations = resp.citations.len(),
                warnings = resp.warnings.len(),
                "answer served"
            );
            Ok(Json(resp))
        }
        Err(e) => {
            let metadata = ErrorMetadataBuilder::new("answer_api")
                .operation("answer")
                .identity(&caller.quota_key())
                .request_id(&Uuid::new_v4().to_string())
                .build(&e);
            e.log(&metadata);
            Err(e)
        }
    }
}

/// 规范链接的站点根地址：优先使用配置，其次读取代理头
pub fn base_url(headers: &HeaderMap, public_base_url: Option<&str>) -> String {
    if let Some(url) = public_base_url.filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let proto = header("x-forwarded-proto").unwrap_or_else(|| "http".into());
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or_else(|| "localhost".into());
    format!("{}://{}", proto, host)
}
