use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, stream_error, BoxError, ChatClient, CompletionResponse, CompletionStream };
use crate::llm::LlmConfig;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: String,
}

impl GoogleChunk {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let content = candidate.content.as_ref()?;
        Some(
            content.parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<String>()
        )
    }
}

fn parse_gemini_event(data: &str) -> Result<Option<String>, BoxError> {
    if let Some(e) = stream_error(data) {
        return Err(e);
    }
    match serde_json::from_str::<GoogleChunk>(data) {
        Ok(chunk) => Ok(chunk.text()),
        Err(e) => {
            debug!("Skipping unparseable Gemini event: {} for data: {}", e, data);
            Ok(None)
        }
    }
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, BoxError> {
        let http = HttpClient::builder().build()?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/models/{}:{}", self.base_url.trim_end_matches('/'), self.model, action)
    }

    fn payload(prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
        }
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse, BoxError> {
        info!("GeminiChatClient::complete() → model={} base_url={}", self.model, self.base_url);

        let resp = self.http
            .post(self.endpoint("generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&Self::payload(prompt))
            .send()
            .await?
            .error_for_status()?
            .json::<GoogleChunk>()
            .await?;

        let text = resp.text().ok_or_else(|| "No candidates in Gemini response".to_string())?;
        Ok(CompletionResponse { response: text })
    }

    async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, BoxError> {
        info!("GeminiChatClient::stream_completion() → model={} base_url={}", self.model, self.base_url);

        let request = self.http
            .post(format!("{}?alt=sse", self.endpoint("streamGenerateContent")))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&Self::payload(prompt));

        http_stream_generate(request, parse_gemini_event).await
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
