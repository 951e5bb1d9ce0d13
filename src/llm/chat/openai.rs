use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use tokio_util::sync::CancellationToken;

use super::{ send_streaming, stream_lines, GenerationRequest, LineEvent, ModelProvider, TokenStream };
use crate::llm::{ LlmConfig, ProviderError };

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Any endpoint speaking the OpenAI chat-completions SSE dialect.
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIStreamError>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamError {
    message: String,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    ProviderError::Config(format!("Invalid API key format: {}", e))
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: completions_endpoint(base_url.as_deref()),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_key && config.base_url.is_none() {
            return Err(ProviderError::Config("OpenAI API key is required".to_string()));
        }

        Self::new(config.api_key.clone(), config.model.clone(), config.base_url.clone())
    }
}

fn completions_endpoint(base_url: Option<&str>) -> String {
    match base_url.map(|u| u.trim_end_matches('/')) {
        None | Some("") => DEFAULT_ENDPOINT.to_string(),
        Some(url) if url.ends_with("/chat/completions") => url.to_string(),
        Some(url) => format!("{}/chat/completions", url),
    }
}

pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        return LineEvent::Skip;
    };
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(resp) => {
            if let Some(err) = resp.error {
                return LineEvent::Error(err.message);
            }
            let text: String = resp.choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() { LineEvent::Skip } else { LineEvent::Token(text) }
        }
        Err(e) => {
            warn!("JSON parse error: {} for data: {}", e, data);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAIChatClient {
    async fn stream_chat(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken
    ) -> Result<TokenStream, ProviderError> {
        let body = OpenAIChatRequest {
            model: &request.model,
            messages: request.messages
                .iter()
                .map(|m| OpenAIMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };
        debug!("POST {} model={} messages={}", self.endpoint, request.model, body.messages.len());

        let response = send_streaming(self.http.post(&self.endpoint).json(&body), &cancel).await?;
        Ok(stream_lines(response, cancel, parse_stream_line))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }
}
