mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use qa_answer::{AnswerService, MemoryThreadStore, ModelInvoker};
use qa_auth::{MemoryApiKeyStore, MemoryQuotaStore, PolicyGate, QuotaStore, RedisQuotaStore};
use qa_llm::{make_chat_model, ChatModel};
use tracing::info;

use crate::config::AppConfig;
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let cfg = AppConfig::load()?;
    let env = |key: &str| std::env::var(key).ok();

    // Build providers
    let chat_model: Option<Arc<dyn ChatModel>> = match cfg.chat_provider_config(env)? {
        Some(provider) => {
            let model: Arc<dyn ChatModel> = Arc::from(make_chat_model(provider)?);
            info!(provider = model.provider(), "chat model configured");
            Some(model)
        }
        None => {
            info!("no chat model configured; answers are evidence-only");
            None
        }
    };
    let invoker =
        ModelInvoker::new(chat_model).with_timeout(Duration::from_millis(cfg.llm.timeout_ms));

    let threads = match cfg.threads.seed_path.as_deref() {
        Some(path) => MemoryThreadStore::from_json_file(path).await?,
        None => MemoryThreadStore::default(),
    };

    let quota: Arc<dyn QuotaStore> = match cfg.quota.kind.as_str() {
        "memory" => Arc::new(MemoryQuotaStore::new()),
        "redis" => {
            let env_name = cfg.quota.redis_url_env.as_deref().unwrap_or("REDIS_URL");
            let url = read_env(env_name)?;
            Arc::new(RedisQuotaStore::new(&url)?)
        }
        other => anyhow::bail!("unsupported quota kind={}", other),
    };
    let keys = MemoryApiKeyStore::new(cfg.api_key_records(env));
    info!(api_keys = keys.len().await, "api keys loaded");

    let gate = PolicyGate::new(cfg.llm.policy(), invoker.is_configured(), Arc::new(keys), quota);
    let state = AppState {
        service: AnswerService::new(Arc::new(threads), invoker),
        gate: Arc::new(gate),
        public_base_url: cfg.server.public_base_url.clone(),
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    tracing::info!(%addr, "qa-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env {}", key))
}
