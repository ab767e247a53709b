use std::sync::Arc;
use std::time::Duration;

use qa_error::QaError;
use qa_llm::ChatModel;
use tracing::{instrument, warn};

use crate::prompt::PromptPair;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// 模型调用封装：任何传输错误或超时都返回空字符串，从不向上抛错。
///
/// 自身不做重试；首次调用与重试调用由编排层各调用一次。
#[derive(Clone)]
pub struct ModelInvoker {
    model: Option<Arc<dyn ChatModel>>,
    timeout: Duration,
}

impl ModelInvoker {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            model,
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    #[instrument(skip(self, prompt), fields(timeout_ms = self.timeout.as_millis() as u64))]
    pub async fn invoke(&self, prompt: &PromptPair) -> String {
        let Some(model) = self.model.as_ref() else {
            return String::new();
        };
        match tokio::time::timeout(self.timeout, model.chat(&prompt.system, &prompt.user)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(provider = model.provider(), error = %e, "model call failed");
                String::new()
            }
            Err(_) => {
                let e = QaError::Timeout {
                    operation: "llm_chat".to_string(),
                    timeout_ms: Some(self.timeout.as_millis() as u64),
                };
                warn!(provider = model.provider(), error = %e, "model call timed out");
                String::new()
            }
        }
    }
}
