//! Language model abstraction
//!
//! The orchestrator only sees the [`LanguageModel`] trait. Two providers exist:
//! - `openai`: any chat-completions compatible endpoint over HTTP
//! - `mock`: scripted responses for tests and offline development

use crate::config::{LlmConfig, ModelParams};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Text-in, text-out completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt with the given parameters
    async fn generate(&self, prompt: &str, params: &ModelParams) -> Result<String>;

    /// Provider name, used in logs and metric labels
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "Eres un especialista en programación curricular del Ministerio de Educación del Perú. \
Responde siempre en español y respeta el formato de tablas solicitado.";

/// Chat-completions client with retry on transient failures
pub struct HttpLanguageModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    max_retries: u32,
}

impl HttpLanguageModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for provider 'openai'".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build()
    }

    async fn make_request(
        &self,
        prompt: &str,
        params: &ModelParams,
    ) -> std::result::Result<String, backoff::Error<AppError>> {
        let request = ChatRequest {
            model: &params.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: params.max_output_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    backoff::Error::permanent(AppError::ModelTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                } else {
                    backoff::Error::transient(AppError::HttpClient(e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = AppError::ModelService {
                message: format!("Model API error {}: {}", status, body),
            };
            // Rate limiting and server faults are worth another attempt
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            };
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::ModelService {
                message: format!("Failed to parse model response: {}", e),
            })
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                backoff::Error::permanent(AppError::ModelService {
                    message: "Empty response from model".to_string(),
                })
            })
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate(&self, prompt: &str, params: &ModelParams) -> Result<String> {
        let start = Instant::now();
        let mut attempt: u32 = 0;
        let max_retries = self.max_retries;

        let result = retry(self.backoff_policy(), || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.make_request(prompt, params).await {
                    Ok(text) => Ok(text),
                    Err(backoff::Error::Transient { err, .. }) if current <= max_retries => {
                        tracing::warn!(
                            attempt = current,
                            max_retries = max_retries,
                            error = %err,
                            "Model request failed, retrying"
                        );
                        Err(backoff::Error::transient(err))
                    }
                    Err(backoff::Error::Transient { err, .. }) => Err(backoff::Error::permanent(err)),
                    Err(permanent) => Err(permanent),
                }
            }
        })
        .await;

        crate::metrics::record_model_call(
            start.elapsed().as_secs_f64(),
            &params.model,
            result.is_ok(),
        );

        result
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// One scripted reply of the mock model
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
    /// Reply after sleeping, for deadline tests
    Delayed(Duration, String),
}

/// Mock model returning scripted replies in order, then a canned document
#[derive(Default)]
pub struct MockLanguageModel {
    script: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

/// Document returned once the script is exhausted
pub const MOCK_DOCUMENT: &str = "| ITEM | CONTENIDO |\n\
|------|-----------|\n\
| Título | Documento de prueba |\n\
| Competencia | Indaga mediante métodos científicos para construir conocimientos |\n\
| Desempeños | Formula preguntas sobre el hecho observado |\n\
| Evaluación | Lista de cotejo |\n";

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str, _params: &ModelParams) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match self.next_reply() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(AppError::ModelService { message }),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Ok(MOCK_DOCUMENT.to_string()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpLanguageModel::new(config)?)),
        "mock" => {
            tracing::warn!("Using mock language model; generated documents are canned");
            Ok(Arc::new(MockLanguageModel::new()))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown llm.provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_follows_script_then_falls_back() {
        let model = MockLanguageModel::with_script([
            MockReply::Text("primero".into()),
            MockReply::Fail("cuota agotada".into()),
        ]);
        let params = ModelParams::default();

        assert_eq!(model.generate("a", &params).await.unwrap(), "primero");
        let err = model.generate("b", &params).await.unwrap_err();
        assert!(err.is_model_failure());
        assert_eq!(model.generate("c", &params).await.unwrap(), MOCK_DOCUMENT);
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_factory_rejects_missing_key() {
        let config = LlmConfig::default();
        assert!(create_language_model(&config).is_err());
    }

    #[test]
    fn test_factory_mock_and_unknown() {
        let mut config = LlmConfig::default();
        config.provider = "mock".into();
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.name(), "mock");

        config.provider = "bedrock".into();
        assert!(matches!(
            create_language_model(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_chat_request_shape() {
        let params = ModelParams::default();
        let request = ChatRequest {
            model: &params.model,
            messages: vec![ChatMessage { role: "user", content: "hola" }],
            max_tokens: params.max_output_tokens,
            temperature: params.temperature,
            top_p: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 4000);
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["content"], "hola");
    }
}
