//! Gemini `generateContent` client.
//!
//! Sends the object name wrapped in a fixed French prompt and extracts the
//! first candidate's text. A well-formed JSON body without that text is not
//! an error: the caller gets `None` and substitutes a placeholder.

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::TransportError;

const PROMPT_TEMPLATE: &str = "Dans quelle poubelle faut-il jeter cet objet : \"{object}\" ? Réponds de manière claire avec le type de poubelle (ex : jaune, verte, marron...) et une explication simple.";

pub fn build_prompt(object: &str) -> String {
    PROMPT_TEMPLATE.replace("{object}", object)
}

/// Anything that can answer a prompt with free text.
pub trait AnswerSource {
    /// `Ok(None)` means the service answered but without usable text.
    fn ask(&self, prompt: &str) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.is_empty())
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a raw response body.
/// Invalid JSON is an error; valid JSON of any other shape yields `None`.
pub fn extract_answer(body: &str) -> Result<Option<String>, TransportError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(serde_json::from_value::<GenerateContentResponse>(value)
        .ok()
        .and_then(GenerateContentResponse::into_first_text))
}

pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(TransportError::from)?;

        if config.api_url.is_empty() {
            warn!("No Gemini endpoint configured; every request will fail");
        }

        Ok(Self { config, client })
    }
}

impl AnswerSource for GeminiClient {
    async fn ask(&self, prompt: &str) -> Result<Option<String>, TransportError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!("Sending prompt to Gemini ({} chars)", prompt.len());

        let resp = self
            .client
            .post(&self.config.api_url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        // Error statuses still carry a JSON body; it simply has no candidates.
        if !resp.status().is_success() {
            warn!("Gemini returned status {}", resp.status());
        }

        let text = resp.text().await?;
        let answer = extract_answer(&text)?;
        match &answer {
            Some(a) => debug!("Gemini answer: '{a}'"),
            None => warn!("Gemini response has no candidate text"),
        }
        Ok(answer)
    }
}
