use std::sync::Arc;

use qa_core::{AnswerResponse, ModelAccess, ResolvedRequest, Result};
use tracing::{debug, info, instrument, warn};

use crate::citation::build_citations;
use crate::evidence::assemble_evidence;
use crate::fallback::evidence_only_answer;
use crate::invoker::ModelInvoker;
use crate::parse::{parse_model_output, ParsedModelOutput};
use crate::prompt::{compose_prompt, PromptPair};
use crate::source::{fetch_threads, ThreadSource};

pub const NOT_CONFIGURED: &str = "LLM not configured; returning retrieved evidence only.";
pub const MODEL_UNAVAILABLE: &str = "LLM unavailable; returning retrieved evidence only.";
pub const INVALID_JSON_WARNING: &str =
    "LLM failed to return valid JSON; returning retrieved evidence only.";

/// 有据问答管线：检索 → 组装证据 → （允许时）调用模型 → 解析 → 引用；任一环节不可用时降级为证据列表
#[derive(Clone)]
pub struct AnswerService {
    source: Arc<dyn ThreadSource>,
    invoker: ModelInvoker,
}

impl AnswerService {
    pub fn new(source: Arc<dyn ThreadSource>, invoker: ModelInvoker) -> Self {
        Self { source, invoker }
    }

    /// 只有检索协作者的失败会以错误返回；模型相关的问题都降级为带警告的回答
    #[instrument(skip(self, request, access), fields(top_k = request.top_k, mode = ?request.mode))]
    pub async fn answer(
        &self,
        request: &ResolvedRequest,
        base_url: &str,
        access: ModelAccess,
    ) -> Result<AnswerResponse> {
        let query = request.query.as_str();
        let mut hits = self.source.search(query, request.top_k).await?;
        hits.truncate(request.top_k);
        let threads = fetch_threads(self.source.as_ref(), &hits).await?;
        debug!(hits = hits.len(), found = threads.len(), "retrieved threads");

        let evidence = assemble_evidence(
            &threads,
            base_url,
            request.max_chars_per_evidence,
            request.include_evidence,
        );

        if let ModelAccess::Denied { message, warnings } = access {
            info!(reason = %message, "model path denied");
            return Ok(evidence_only_answer(
                query,
                evidence.for_response,
                warnings,
                &message,
            ));
        }
        if !self.invoker.is_configured() {
            return Ok(evidence_only_answer(
                query,
                evidence.for_response,
                vec![NOT_CONFIGURED.to_string()],
                NOT_CONFIGURED,
            ));
        }

        let prompt = compose_prompt(query, request.mode, &evidence.for_model);
        let Some(parsed) = self.call_with_retry(&prompt).await else {
            return Ok(evidence_only_answer(
                query,
                evidence.for_response,
                vec![INVALID_JSON_WARNING.to_string()],
                MODEL_UNAVAILABLE,
            ));
        };

        let outcome = build_citations(&parsed.used_indices, &parsed.quotes, &evidence.for_model);
        let mut warnings = parsed.warnings;
        warnings.extend(outcome.warnings);
        info!(
            citations = outcome.citations.len(),
            warnings = warnings.len(),
            "model answer accepted"
        );

        Ok(AnswerResponse {
            query: query.to_string(),
            answer_markdown: parsed.answer_markdown,
            citations: outcome.citations,
            retrieved: evidence.for_response,
            warnings,
        })
    }

    /// 首次解析失败后用更严格的提示重试一次，两次调用严格串行
    async fn call_with_retry(&self, prompt: &PromptPair) -> Option<ParsedModelOutput> {
        let first = self.invoker.invoke(prompt).await;
        match parse_model_output(&first) {
            Ok(parsed) => return Some(parsed),
            Err(e) => warn!(error = %e, "first model reply rejected, retrying"),
        }

        let second = self.invoker.invoke(&prompt.with_strict_json()).await;
        match parse_model_output(&second) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "retry model reply rejected");
                None
            }
        }
    }
}
