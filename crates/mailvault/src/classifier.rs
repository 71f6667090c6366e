//! Chat-completions client for the external classifier collaborator.

use std::time::Duration;

use mailvault_core::{Classifier, ClassifierError, ClassifyRequest};
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are given the sender address, plain-text body, and \
extracted PDF text of an email. Respond with a single JSON object with exactly these \
keys: \"organization\" (the name of the sender's organization), \"spam\" (\"Yes\" or \
\"No\"), and \"invoice\" (a number between 0.0 and 1.0, the probability that the PDF \
is an invoice).";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// [`Classifier`] backed by an `OpenAI`-compatible chat-completions
/// endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    /// Create a client from the classifier section of the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ClassifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

impl Classifier for OpenAiClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        let user_content = format!(
            "Sender: {}\n\nBody:\n{}\n\nPDF text:\n{}",
            request.sender, request.body, request.pdf_excerpt
        );
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError(format!(
                "classifier endpoint returned {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError(format!("malformed endpoint response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError("endpoint returned no choices".to_string()))
    }
}
