use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// 问答服务的统一错误类型。
///
/// 模型相关的失败（`LlmService`、`Timeout`）在答案流水线内部被吞掉并降级为
/// 仅证据回答；只有检索协作者的失败会作为 5xx 返回给调用方。
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum QaError {
    #[error("请求校验失败: {message}")]
    Validation { message: String },

    #[error("模型服务错误 ({provider}): {message}")]
    LlmService { provider: String, message: String },

    #[error("存储错误: {operation} 失败")]
    Storage { operation: String, message: String },

    #[error("网络错误: {operation}")]
    Network { operation: String, message: String },

    #[error("超时: {operation}")]
    Timeout {
        operation: String,
        timeout_ms: Option<u64>,
    },

    #[error("配置错误: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("序列化错误: {format}")]
    Serialization { format: String, message: String },
}

/// 错误严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// 错误元数据；`identity` 是配额键，从不包含密钥明文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub identity: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: std::collections::HashMap<String, String>,
}

impl QaError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QaError::Validation { .. } => ErrorSeverity::Low,
            QaError::LlmService { .. } | QaError::Network { .. } | QaError::Timeout { .. } => {
                ErrorSeverity::Medium
            }
            QaError::Storage { .. } | QaError::Serialization { .. } => ErrorSeverity::High,
            QaError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// 按严重级别写结构化日志
    pub fn log(&self, metadata: &ErrorMetadata) {
        match metadata.severity {
            ErrorSeverity::Low => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    identity = ?metadata.identity,
                    request_id = ?metadata.request_id,
                    error = %self,
                    "request rejected"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    identity = ?metadata.identity,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    "upstream failure"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    identity = ?metadata.identity,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    severity = ?metadata.severity,
                    "service failure"
                );
            }
        }
    }

    pub fn to_http_status(&self) -> u16 {
        match self {
            QaError::Validation { .. } => 400,
            QaError::LlmService { .. } | QaError::Network { .. } => 502,
            QaError::Timeout { .. } => 504,
            QaError::Storage { .. }
            | QaError::Configuration { .. }
            | QaError::Serialization { .. } => 500,
        }
    }

    /// 返回给调用方的英文说明，不暴露内部细节
    pub fn user_message(&self) -> String {
        match self {
            QaError::Validation { message } => format!("Invalid request: {}", message),
            QaError::LlmService { .. } | QaError::Network { .. } => {
                "An upstream service failed, try again later.".to_string()
            }
            QaError::Timeout { .. } => "An upstream service timed out, try again.".to_string(),
            _ => "Internal error, contact the administrator.".to_string(),
        }
    }
}

/// 错误元数据构造器
pub struct ErrorMetadataBuilder {
    metadata: ErrorMetadata,
}

impl ErrorMetadataBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            metadata: ErrorMetadata {
                error_id: uuid::Uuid::new_v4().to_string(),
                severity: ErrorSeverity::Medium,
                component: component.to_string(),
                operation: None,
                identity: None,
                request_id: None,
                timestamp: chrono::Utc::now(),
                context: std::collections::HashMap::new(),
            },
        }
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.metadata.operation = Some(operation.to_string());
        self
    }

    pub fn identity(mut self, identity: &str) -> Self {
        self.metadata.identity = Some(identity.to_string());
        self
    }

    pub fn request_id(mut self, request_id: &str) -> Self {
        self.metadata.request_id = Some(request_id.to_string());
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(mut self, error: &QaError) -> ErrorMetadata {
        self.metadata.severity = error.severity();
        self.metadata
    }
}

pub type Result<T> = std::result::Result<T, QaError>;

impl From<serde_json::Error> for QaError {
    fn from(err: serde_json::Error) -> Self {
        QaError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for QaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return QaError::Timeout {
                operation: "http_request".to_string(),
                timeout_ms: None,
            };
        }
        let operation = if err.is_connect() {
            "connect"
        } else if err.is_decode() {
            "http_response"
        } else {
            "http_request"
        };
        QaError::Network {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for QaError {
    fn into_response(self) -> axum::response::Response {
        let status_code = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.to_string(),
            "message": self.user_message()
        });

        (status_code, Json(body)).into_response()
    }
}
