//! Follow-up question rewriting.
//!
//! A follow-up like "and its population?" retrieves poorly on its own, so
//! when there is prior conversation the model is asked to restate it as a
//! standalone question. Rewriting is best effort: any failure falls back to
//! the question as asked.

use serde::Serialize;

use crate::llm::LanguageModel;
use crate::models::ConversationTurn;

/// Result of [`rewrite`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rewrite {
    /// No history; the question is used byte-for-byte.
    Unchanged { question: String },
    Rewritten { original: String, question: String },
    /// The model call failed or returned nothing; `question` is the original.
    Fallback { question: String, reason: String },
}

impl Rewrite {
    /// The question to retrieve and answer with.
    pub fn question(&self) -> &str {
        match self {
            Rewrite::Unchanged { question }
            | Rewrite::Rewritten { question, .. }
            | Rewrite::Fallback { question, .. } => question,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Rewrite::Fallback { .. })
    }
}

/// One `User: …` / `Assistant: …` line per turn.
pub fn render_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_rewrite_prompt(question: &str, history: &[ConversationTurn]) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\n\
         Chat History:\n{}\n\
         Follow Up Input: {}\n\
         Standalone question:",
        render_history(history),
        question
    )
}

pub async fn rewrite(
    model: &dyn LanguageModel,
    question: &str,
    history: &[ConversationTurn],
) -> Rewrite {
    if history.is_empty() {
        return Rewrite::Unchanged {
            question: question.to_string(),
        };
    }

    let prompt = build_rewrite_prompt(question, history);
    let reason = match model.generate(&prompt).await {
        Ok(reply) => {
            let standalone = reply.trim();
            if !standalone.is_empty() {
                tracing::debug!(original = question, rewritten = standalone, "rewrote question");
                return Rewrite::Rewritten {
                    original: question.to_string(),
                    question: standalone.to_string(),
                };
            }
            "model returned an empty question".to_string()
        }
        Err(e) => e.to_string(),
    };

    tracing::warn!(%reason, "question rewrite failed; using the original question");
    Rewrite::Fallback {
        question: question.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, prompt: &str) -> Result<String, RagError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(RagError::ModelCall)
        }
    }

    fn history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("What is the capital of France?"),
            ConversationTurn::assistant("Paris."),
        ]
    }

    #[tokio::test]
    async fn test_empty_history_skips_model() {
        let model = Scripted::new(Ok("ignored"));
        let q = "  Wie groß ist Paris?  ";
        let r = rewrite(&model, q, &[]).await;
        assert_eq!(r.question(), q);
        assert!(matches!(r, Rewrite::Unchanged { .. }));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_rewrites_with_history() {
        let model = Scripted::new(Ok(" What is the population of Paris? \n"));
        let r = rewrite(&model, "and its population?", &history()).await;
        assert_eq!(r.question(), "What is the population of Paris?");
        assert_eq!(model.calls(), 1);

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("User: What is the capital of France?\nAssistant: Paris."));
        assert!(prompt.contains("Follow Up Input: and its population?"));
        assert!(prompt.ends_with("Standalone question:"));
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let model = Scripted::new(Err("quota exceeded"));
        let r = rewrite(&model, "and its population?", &history()).await;
        assert!(r.is_fallback());
        assert_eq!(r.question(), "and its population?");
        match r {
            Rewrite::Fallback { reason, .. } => assert!(reason.contains("quota exceeded")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back() {
        let model = Scripted::new(Ok("   "));
        let r = rewrite(&model, "why?", &history()).await;
        assert!(r.is_fallback());
        assert_eq!(r.question(), "why?");
    }

    #[test]
    fn test_render_history() {
        assert_eq!(render_history(&[]), "");
        assert_eq!(render_history(&history()), "User: What is the capital of France?\nAssistant: Paris.");
    }
}
