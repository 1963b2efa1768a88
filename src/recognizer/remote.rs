//! LLM-backed intent recognizer: builds a classification prompt, calls a
//! generative model endpoint over blocking HTTP, and parses a JSON object out
//! of the response. Any failure (network, timeout, malformed JSON, exhausted
//! retries) falls back to a keyword substring match — this recognizer never
//! raises to its caller.

use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value as Json;
use tracing::warn;

use crate::config::RemoteRecognizerConfig;
use crate::errors::DslError;

use super::{IntentResult, Recognizer, RecognizerContext};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Calls a Gemini-style `generateContent` endpoint to classify an utterance.
pub struct RemoteRecognizer {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    config: RemoteRecognizerConfig,
}

impl RemoteRecognizer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: Option<String>) -> Result<Self, DslError> {
        let config = RemoteRecognizerConfig::default();
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DslError::RecognizerConfig(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            config,
        })
    }

    pub fn with_config(mut self, config: RemoteRecognizerConfig) -> Self {
        self.config = config;
        self
    }

    fn request_url(&self) -> String {
        format!("{}/{}:generateContent?key={}", self.endpoint, self.model, self.api_key)
    }

    fn build_prompt(&self, utterance: &str, candidates: &[String]) -> String {
        let intent_list = candidates.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n");
        format!(
            "You are an intent classification system. Given the candidate intents:\n{intent_list}\n\n\
             User said: \"{utterance}\"\n\n\
             Respond with only a JSON object: {{\"intent\": one of the candidates above or an empty \
             string, \"confidence\": a number from 0 to 1, \"entities\": an object of extracted values}}."
        )
    }

    fn make_request(&self, prompt: &str) -> Result<String, String> {
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.1, "maxOutputTokens": 500 },
        });

        let mut last_err = String::from("no attempts made");
        let attempts = std::iter::once(Duration::ZERO).chain(self.config.retry_backoff.iter().copied()).take(3);
        for (attempt, backoff) in attempts.enumerate() {
            if attempt > 0 {
                std::thread::sleep(backoff);
            }

            let response = match self.client.post(self.request_url()).json(&payload).send() {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    warn!(attempt, "remote recognizer request timed out, retrying");
                    last_err = "timeout".to_string();
                    continue;
                }
                Err(e) => return Err(e.to_string()),
            };

            match response.status() {
                StatusCode::OK => {
                    let body: Json = response.json().map_err(|e| e.to_string())?;
                    let text = body["candidates"][0]["content"]["parts"][0]["text"].as_str().unwrap_or("").to_string();
                    return Ok(text);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!(attempt, "remote recognizer rate-limited, retrying with backoff");
                    last_err = "rate limited".to_string();
                    continue;
                }
                other => return Err(format!("remote recognizer returned status {other}")),
            }
        }

        Err(last_err)
    }

    fn parse_response(&self, response: &str, candidates: &[String]) -> Option<IntentResult> {
        let brace_pattern = Regex::new(r"\{[^{}]*\}").ok()?;
        let json_text = brace_pattern.find(response)?.as_str();
        let parsed: Json = serde_json::from_str(json_text).ok()?;

        let mut intent = parsed.get("intent").and_then(Json::as_str).unwrap_or("").to_string();
        let confidence = parsed.get("confidence").and_then(Json::as_f64).unwrap_or(0.0).clamp(0.0, 1.0);

        if !intent.is_empty() && !candidates.iter().any(|c| c == &intent) {
            intent = candidates
                .iter()
                .find(|c| intent.to_lowercase().contains(&c.to_lowercase()) || c.to_lowercase().contains(&intent.to_lowercase()))
                .cloned()
                .unwrap_or_default();
        }

        Some(IntentResult {
            intent,
            confidence,
            entities: Default::default(),
            is_silence: false,
        })
    }

    fn fallback_keyword_match(&self, text: &str, candidates: &[String]) -> IntentResult {
        let text_lower = text.to_lowercase();
        for candidate in candidates {
            let candidate_lower = candidate.to_lowercase();
            if text_lower.contains(&candidate_lower) {
                return IntentResult {
                    intent: candidate.clone(),
                    confidence: 0.6,
                    entities: Default::default(),
                    is_silence: false,
                };
            }
            if text_lower.split_whitespace().any(|w| w.len() > 1 && candidate_lower.contains(w)) {
                return IntentResult {
                    intent: candidate.clone(),
                    confidence: 0.4,
                    entities: Default::default(),
                    is_silence: false,
                };
            }
        }
        IntentResult::no_match()
    }
}

impl Recognizer for RemoteRecognizer {
    fn recognize(&self, utterance: &str, candidates: &[String], _ctx: RecognizerContext<'_>) -> IntentResult {
        if utterance.trim().is_empty() {
            return IntentResult::silence();
        }

        let prompt = self.build_prompt(utterance, candidates);
        match self.make_request(&prompt) {
            Ok(response) => self.parse_response(&response, candidates).unwrap_or_else(|| {
                warn!(utterance_len = utterance.len(), "remote recognizer returned unparsable response, falling back");
                self.fallback_keyword_match(utterance, candidates)
            }),
            Err(reason) => {
                warn!(utterance_len = utterance.len(), reason, "remote recognizer call failed, falling back to keyword match");
                self.fallback_keyword_match(utterance, candidates)
            }
        }
    }
}
