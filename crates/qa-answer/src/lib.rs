pub mod citation;
pub mod evidence;
pub mod fallback;
pub mod invoker;
pub mod markdown;
pub mod parse;
pub mod prompt;
pub mod service;
pub mod snippet;
pub mod source;

pub use citation::{build_citations, derive_quote, CitationOutcome, MAX_QUOTE_CHARS};
pub use evidence::{assemble_evidence, build_retrieved_items, canonical_url, EvidenceSet};
pub use fallback::{evidence_only_answer, NO_MATCHES_ANSWER};
pub use invoker::{ModelInvoker, DEFAULT_MODEL_TIMEOUT};
pub use markdown::markdown_to_text;
pub use parse::{extract_json_candidate, parse_model_output, ModelQuote, ParseFailure, ParsedModelOutput};
pub use prompt::{compose_prompt, PromptPair, SYSTEM_PROMPT};
pub use service::{AnswerService, INVALID_JSON_WARNING, MODEL_UNAVAILABLE, NOT_CONFIGURED};
pub use snippet::{build_evidence_snippet, truncate_chars};
pub use source::{fetch_threads, MemoryThreadStore, ThreadSource};

pub use qa_error::{QaError, Result};
