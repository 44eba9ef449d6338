//! Grounded answer generation.
//!
//! Retrieved chunks are concatenated in rank order into a bounded context
//! block. The prompt tells the model to answer from that context only and to
//! say it does not know otherwise.

use pdf_rag_core::index::ScoredChunk;

use crate::error::RagError;
use crate::llm::LanguageModel;

const CHUNK_SEPARATOR: &str = "\n\n";

/// Answer text plus how many of the ranked chunks made it into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub used: usize,
}

/// Join chunk texts best-first within `max_chars` (counted in chars).
///
/// Whole chunks only, except that the first chunk is always included and is
/// truncated when it alone exceeds the budget. Returns the context and the
/// number of chunks used.
pub fn build_context(chunks: &[ScoredChunk], max_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut len = 0usize;
    let mut used = 0usize;

    for (i, hit) in chunks.iter().enumerate() {
        let text = hit.chunk.text.as_str();
        let text_len = text.chars().count();
        if i == 0 {
            if text_len > max_chars {
                context.extend(text.chars().take(max_chars));
                return (context, 1);
            }
        } else {
            let sep = CHUNK_SEPARATOR.chars().count();
            if len + sep + text_len > max_chars {
                break;
            }
            context.push_str(CHUNK_SEPARATOR);
            len += sep;
        }
        context.push_str(text);
        len += text_len;
        used += 1;
    }

    (context, used)
}

pub fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         Context: {}\n\n\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}

/// One model call; failures surface as [`RagError::ModelCall`].
pub async fn generate(
    model: &dyn LanguageModel,
    question: &str,
    chunks: &[ScoredChunk],
    max_context_chars: usize,
) -> Result<GeneratedAnswer, RagError> {
    let (context, used) = build_context(chunks, max_context_chars);
    let prompt = build_answer_prompt(question, &context);
    tracing::debug!(chunks = used, context_chars = context.len(), "generating answer");

    let answer = model.generate(&prompt).await.map_err(|e| match e {
        RagError::ModelCall(_) => e,
        other => RagError::ModelCall(other.to_string()),
    })?;

    Ok(GeneratedAnswer {
        answer: answer.trim().to_string(),
        used,
    })
}
