use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use tokio_util::sync::CancellationToken;

use super::{ send_streaming, stream_lines, GenerationRequest, LineEvent, ModelProvider, TokenStream };
use crate::llm::{ LlmConfig, LlmType, ProviderError };

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| "llama3.1".to_string());
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        if config.llm_type != LlmType::Ollama {
            return Err(ProviderError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.model.clone()))
    }
}

/// Ollama streams one JSON object per line and closes after `done: true`.
pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return LineEvent::Error(err);
            }
            match resp.message {
                Some(msg) if !msg.content.is_empty() => LineEvent::Token(msg.content),
                _ if resp.done => LineEvent::Done,
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            info!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn stream_chat(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken
    ) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &request.model,
            messages: request.messages
                .iter()
                .map(|m| RequestMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            stream: true,
            options: RequestOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };
        debug!("POST {} model={}", url, request.model);

        let response = send_streaming(self.http.post(&url).json(&body), &cancel).await?;
        Ok(stream_lines(response, cancel, parse_stream_line))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
