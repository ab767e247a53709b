use qa_core::{clamp_evidence_chars, RetrievedItem, Thread};

use crate::snippet::build_evidence_snippet;

/// 同一批证据的两份视图：模型始终看到完整片段，调用方按 `include_evidence` 决定是否可见
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceSet {
    pub for_model: Vec<RetrievedItem>,
    pub for_response: Vec<RetrievedItem>,
}

impl EvidenceSet {
    pub fn is_empty(&self) -> bool {
        self.for_model.is_empty()
    }
}

/// `{base_url 去掉末尾斜杠}/q/{id}`
pub fn canonical_url(base_url: &str, id: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    format!("{}/q/{}", base, id)
}

pub fn build_retrieved_items(
    threads: &[Thread],
    base_url: &str,
    max_chars: usize,
    include_evidence: bool,
) -> Vec<RetrievedItem> {
    let max = clamp_evidence_chars(max_chars as i64);
    threads
        .iter()
        .map(|thread| RetrievedItem {
            id: thread.id.clone(),
            title: thread.title.clone(),
            url: canonical_url(base_url, &thread.id),
            snippet: if include_evidence {
                build_evidence_snippet(thread, max)
            } else {
                String::new()
            },
        })
        .collect()
}

pub fn assemble_evidence(
    threads: &[Thread],
    base_url: &str,
    max_chars: usize,
    include_evidence: bool,
) -> EvidenceSet {
    let for_model = build_retrieved_items(threads, base_url, max_chars, true);
    let for_response = if include_evidence {
        for_model.clone()
    } else {
        for_model.iter().map(RetrievedItem::without_snippet).collect()
    };
    EvidenceSet {
        for_model,
        for_response,
    }
}
