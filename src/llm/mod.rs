use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error, warn};

use crate::error::{Error, Result};
use crate::models::{ScreenAnalysis, ScreenContext};
use crate::settings::Settings;

pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"Analyze this screenshot and return a JSON object with:
- current_focus: what the user is currently working on (1-2 sentences)
- active_software: which application is in use
- context_keywords: key topics and technologies (array of strings)

Return ONLY valid JSON, no other text. Example format:
{"current_focus": "writing Rust backend code", "active_software": "VS Code", "context_keywords": ["Rust", "SQLite", "async"]}"#;

pub const DEFAULT_SUMMARY_PROMPT: &str = r#"You are a work-journal assistant. From today's activity records below, write a structured daily report in Markdown.

Requirements:
1. Organize the report chronologically
2. Pull out the key work items and technical keywords
3. Summarize today's outcomes and the problems encountered
4. Output pure Markdown with no surrounding commentary

Today's records:
{records}

Write the report:"#;

const ANALYSIS_MAX_TOKENS: u32 = 500;
const SUMMARY_MAX_TOKENS: u32 = 2000;

/// Extracts semantic context from one frame. Exactly one attempt per call;
/// each call has real cost, so there are no retries.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze_frame(&self, settings: &Settings, png_bytes: &[u8]) -> Result<ScreenContext>;
}

/// Turns an assembled prompt into a generated narrative. One attempt, no
/// retries.
#[async_trait]
pub trait TextSynthesizer: Send + Sync {
    async fn synthesize(&self, settings: &Settings, prompt: &str) -> Result<String>;
}

/// Mask an API key for safe logging: show only the last 4 characters.
/// Counts characters, not bytes, so multibyte keys never split a char.
pub fn mask_api_key(key: &str) -> String {
    let chars = key.chars().count();
    if chars <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(chars - 4).collect();
    format!("****{tail}")
}

/// Some models wrap JSON in markdown code fences despite being instructed
/// otherwise. Strip those before parsing.
fn strip_code_fence(content: &str) -> &str {
    let content = content.trim();
    if let Some(inner) = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
    {
        inner.trim_end_matches("```").trim()
    } else {
        content
    }
}

fn parse_screen_context(content: &str) -> ScreenContext {
    let stripped = strip_code_fence(content);
    match serde_json::from_str::<ScreenAnalysis>(stripped) {
        Ok(analysis) => ScreenContext::Structured(analysis),
        Err(err) => {
            warn!("vision response was not valid schema JSON ({err}); keeping raw text");
            ScreenContext::Raw(content.trim().to_string())
        }
    }
}

/// Adapter for any OpenAI-compatible chat-completions endpoint. Implements
/// both remote capabilities; endpoint, models and key come from the
/// settings passed per call, so edits apply without rebuilding the client.
pub struct OpenAiClient {
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn chat(
        &self,
        settings: &Settings,
        model: &str,
        messages: serde_json::Value,
        max_tokens: u32,
        caller: &str,
        mk_err: fn(String) -> Error,
    ) -> Result<String> {
        let endpoint = format!("{}/chat/completions", settings.api_base_url);
        debug!(
            "llm request: caller={caller} endpoint={endpoint} model={model} key={}",
            mask_api_key(&settings.api_key)
        );

        let request_body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|err| mk_err(format!("API request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("llm error: caller={caller} status={status} body={body}");
            return Err(mk_err(format!("API error ({status}): {body}")));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|err| mk_err(format!("failed to parse response: {err}")))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| mk_err("no content in response".to_string()))?;

        debug!("llm response: caller={caller} chars={}", content.len());
        Ok(content.to_string())
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiClient {
    async fn analyze_frame(&self, settings: &Settings, png_bytes: &[u8]) -> Result<ScreenContext> {
        let prompt = settings
            .analysis_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_ANALYSIS_PROMPT);

        let image_b64 = BASE64.encode(png_bytes);
        let messages = serde_json::json!([
            {
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {
                        "url": format!("data:image/png;base64,{image_b64}")
                    }}
                ]
            }
        ]);

        let content = self
            .chat(
                settings,
                &settings.vision_model,
                messages,
                ANALYSIS_MAX_TOKENS,
                "analyze_frame",
                Error::Analysis,
            )
            .await?;

        Ok(parse_screen_context(&content))
    }
}

#[async_trait]
impl TextSynthesizer for OpenAiClient {
    async fn synthesize(&self, settings: &Settings, prompt: &str) -> Result<String> {
        let messages = serde_json::json!([
            {"role": "user", "content": prompt}
        ]);

        self.chat(
            settings,
            &settings.summary_model,
            messages,
            SUMMARY_MAX_TOKENS,
            "synthesize",
            Error::SynthesisFailed,
        )
        .await
    }
}
