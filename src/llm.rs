//! Chat model clients.
//!
//! The provider is resolved exactly once at startup into an [`LlmSelection`].
//! `provider = "auto"` prefers Google when `GOOGLE_API_KEY` is set and falls
//! back to OpenAI when `OPENAI_API_KEY` is set. With neither the pipeline
//! runs in degraded mode: ingestion works, queries get a fixed message.
//!
//! | Provider | Endpoint | Default model |
//! |----------|----------|---------------|
//! | `google` | `models/{model}:generateContent` | `gemini-2.5-flash` |
//! | `openai` | `chat/completions` | `gpt-3.5-turbo` |

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, LlmProviderKind};
use crate::error::RagError;
use crate::http::{build_client, post_json};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name, e.g. `"google"`.
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// The chat backend chosen for this process.
#[derive(Clone, PartialEq, Eq)]
pub enum LlmSelection {
    Google { api_key: String, model: String },
    OpenAi { api_key: String, model: String },
    None,
}

impl std::fmt::Debug for LlmSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmSelection::Google { model, .. } => write!(f, "Google({})", model),
            LlmSelection::OpenAi { model, .. } => write!(f, "OpenAi({})", model),
            LlmSelection::None => f.write_str("None"),
        }
    }
}

impl LlmSelection {
    /// Resolve the configured provider against API keys from `lookup`.
    ///
    /// An explicit provider whose key is missing resolves to `None` with a
    /// warning instead of failing startup.
    pub fn resolve<F>(config: &LlmConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let google = |api_key: String| LlmSelection::Google {
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };
        let openai = |api_key: String| LlmSelection::OpenAi {
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        };

        match config.provider {
            LlmProviderKind::None => LlmSelection::None,
            LlmProviderKind::Auto => {
                if let Some(k) = key(GOOGLE_API_KEY) {
                    google(k)
                } else if let Some(k) = key(OPENAI_API_KEY) {
                    openai(k)
                } else {
                    LlmSelection::None
                }
            }
            LlmProviderKind::Google => key(GOOGLE_API_KEY).map(google).unwrap_or_else(|| {
                tracing::warn!("llm.provider = \"google\" but {} is not set", GOOGLE_API_KEY);
                LlmSelection::None
            }),
            LlmProviderKind::OpenAi => key(OPENAI_API_KEY).map(openai).unwrap_or_else(|| {
                tracing::warn!("llm.provider = \"openai\" but {} is not set", OPENAI_API_KEY);
                LlmSelection::None
            }),
        }
    }

    pub fn from_env(config: &LlmConfig) -> Self {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// `"google"`, `"openai"` or `"none"`.
    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmSelection::Google { .. } => "google",
            LlmSelection::OpenAi { .. } => "openai",
            LlmSelection::None => "none",
        }
    }
}

/// Build the client for `selection`; `Ok(None)` in degraded mode.
pub fn create_model(
    selection: &LlmSelection,
    config: &LlmConfig,
) -> Result<Option<Arc<dyn LanguageModel>>, RagError> {
    let client = || build_client(config.timeout_secs).map_err(RagError::Configuration);
    match selection {
        LlmSelection::None => Ok(None),
        LlmSelection::Google { api_key, model } => Ok(Some(Arc::new(GeminiModel {
            api_key: api_key.clone(),
            model: model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: client()?,
        }))),
        LlmSelection::OpenAi { api_key, model } => Ok(Some(Arc::new(OpenAiChatModel {
            api_key: api_key.clone(),
            model: model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: client()?,
        }))),
    }
}

// ============ Gemini ============

pub struct GeminiModel {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

fn parse_gemini_response(json: serde_json::Value) -> Result<String, RagError> {
    let response: GeminiResponse = serde_json::from_value(json)
        .map_err(|e| RagError::ModelCall(format!("invalid Gemini response: {}", e)))?;
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| RagError::ModelCall("Gemini returned no candidates".to_string()))?;
    Ok(content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "google"
    }
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
            },
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| RagError::ModelCall(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| RagError::Configuration(format!("invalid {}: {}", GOOGLE_API_KEY, e)))?,
        );
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let json = post_json(&self.client, "Gemini", &url, headers, &body, self.max_retries)
            .await
            .map_err(RagError::ModelCall)?;
        parse_gemini_response(json)
    }
}

// ============ OpenAI ============

pub struct OpenAiChatModel {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

fn parse_openai_chat_response(json: &serde_json::Value) -> Result<String, RagError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::ModelCall("invalid OpenAI response: missing choices[0].message.content".into())
        })
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        "openai"
    }
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| RagError::Configuration(format!("invalid {}: {}", OPENAI_API_KEY, e)))?,
        );
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let json = post_json(&self.client, "OpenAI", &url, headers, &body, self.max_retries)
            .await
            .map_err(RagError::ModelCall)?;
        parse_openai_chat_response(&json)
    }
}
