use async_trait::async_trait;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Mutex;

use super::{ BoxError, ChatClient, CompletionResponse, CompletionStream };

pub const PROVIDER_SECRET_ERROR: &str = "upstream quota exceeded for key sk-live-0000";

#[derive(Default)]
pub struct MockChatClient {
    chunks: Vec<String>,
    fail_complete: bool,
    fail_stream_setup: bool,
    fail_after: Option<usize>,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockChatClient {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks
                .iter()
                .map(|c| c.to_string())
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn failing_stream_setup(mut self) -> Self {
        self.fail_stream_setup = true;
        self
    }

    /// Stream yields `count` fragments, then a provider error.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.complete_calls() + self.stream_calls()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn full_text(&self) -> String {
        self.chunks.concat()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(&self, prompt: &str) -> Result<CompletionResponse, BoxError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_complete {
            return Err(PROVIDER_SECRET_ERROR.into());
        }
        Ok(CompletionResponse { response: self.full_text() })
    }

    async fn stream_completion(&self, prompt: &str) -> Result<CompletionStream, BoxError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_stream_setup {
            return Err(PROVIDER_SECRET_ERROR.into());
        }

        let mut items: Vec<Result<String, BoxError>> = Vec::new();
        match self.fail_after {
            Some(count) => {
                items.extend(self.chunks.iter().take(count).cloned().map(Ok));
                items.push(Err(PROVIDER_SECRET_ERROR.into()));
            }
            None => items.extend(self.chunks.iter().cloned().map(Ok)),
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "mock".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }
}
