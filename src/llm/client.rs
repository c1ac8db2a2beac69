// src/llm/client.rs

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ImplementerError;
use crate::llm::prompt::{build_prompt, LlmPrompt, PromptLimits};
use crate::llm::{Implementer, ProposalRequest};

const PROMPT_ABI_VERSION: &str = "v1-stub-implementer";

const OPENAI_URL: &str = "https://api.openai.com/v1/responses";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    fn key_env(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-5.2",
            Provider::Anthropic => "claude-sonnet-4-5",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Fills gaps from the environment and the saved provider file.
    pub fn resolve(provider: Provider, model: Option<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let saved = load_saved().filter(|c| c.provider == provider);

        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env::var(provider.key_env()).ok())
            .or_else(|| saved.as_ref().map(|c| c.api_key.clone()))
            .unwrap_or_default();

        let model = model
            .or_else(|| saved.as_ref().map(|c| c.model.clone()))
            .unwrap_or_else(|| provider.default_model().to_string());

        let base_url = base_url.or_else(|| saved.and_then(|c| c.base_url));

        Self {
            provider,
            model,
            api_key,
            base_url,
        }
    }
}

/// One provider call, ready to send.
#[derive(Debug)]
struct ProviderRequest {
    url: String,
    headers: Vec<(&'static str, String)>,
    body: Value,
}

impl ProviderConfig {
    fn endpoint(&self, default: &str) -> String {
        self.base_url.clone().unwrap_or_else(|| default.to_string())
    }

    fn request(&self, prompt: &LlmPrompt) -> ProviderRequest {
        match self.provider {
            Provider::OpenAI => ProviderRequest {
                url: self.endpoint(OPENAI_URL),
                headers: vec![("Authorization", format!("Bearer {}", self.api_key))],
                body: serde_json::json!({
                    "model": self.model,
                    "instructions": prompt.system,
                    "input": prompt.user,
                    "max_output_tokens": MAX_OUTPUT_TOKENS,
                }),
            },

            Provider::Anthropic => ProviderRequest {
                url: self.endpoint(ANTHROPIC_URL),
                headers: vec![
                    ("x-api-key", self.api_key.clone()),
                    ("anthropic-version", ANTHROPIC_VERSION.to_string()),
                ],
                body: serde_json::json!({
                    "model": self.model,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "system": prompt.system,
                    "messages": [{ "role": "user", "content": prompt.user }],
                }),
            },
        }
    }
}

/// Implementer backed by a hosted LLM.
pub struct HttpImplementer {
    cfg: ProviderConfig,
    limits: PromptLimits,
    timeout: Duration,
    http: reqwest::blocking::Client,
}

impl HttpImplementer {
    pub fn new(cfg: ProviderConfig, limits: PromptLimits, timeout: Duration) -> Result<Self, ImplementerError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ImplementerError::Unavailable(format!("http client: {e}")))?;

        Ok(Self {
            cfg,
            limits,
            timeout,
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.cfg.api_key.trim().is_empty()
    }

    fn run(&self, prompt: &LlmPrompt) -> Result<String, ImplementerError> {
        if !self.is_configured() {
            return Err(ImplementerError::Unavailable(format!(
                "{} not set",
                self.cfg.provider.key_env()
            )));
        }

        let request = self.cfg.request(prompt);
        tracing::debug!(
            prompt_hash = %hash_prompt(prompt),
            model = %self.cfg.model,
            url = %request.url,
            "calling llm"
        );

        let mut builder = self
            .http
            .post(&request.url)
            .timeout(self.timeout)
            .json(&request.body);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let resp = builder.send().map_err(|e| {
            if e.is_timeout() {
                ImplementerError::Request(format!("no answer within {}s", self.timeout.as_secs()))
            } else {
                ImplementerError::Unavailable(e.to_string())
            }
        })?;
        let status = resp.status();
        let json: Value = resp
            .json()
            .map_err(|e| ImplementerError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ImplementerError::Request(format!("LLM error {status}: {json}")));
        }

        extract_text(self.cfg.provider, &json)
    }
}

impl Implementer for HttpImplementer {
    fn name(&self) -> &str {
        &self.cfg.model
    }

    fn propose(&self, request: &ProposalRequest) -> Result<String, ImplementerError> {
        let prompt = build_prompt(request, self.limits);
        self.run(&prompt)
    }
}

fn hash_prompt(prompt: &LlmPrompt) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.system.as_bytes());
    h.update(prompt.user.as_bytes());
    hex::encode(h.finalize())
}

fn extract_text(provider: Provider, v: &Value) -> Result<String, ImplementerError> {
    let text = match provider {
        Provider::OpenAI => v
            .get("output")
            .and_then(|o| o.as_array())
            .and_then(|arr| {
                arr.iter().find_map(|item| {
                    item.get("content")?
                        .as_array()?
                        .iter()
                        .find_map(|c| c.get("text")?.as_str())
                })
            }),

        Provider::Anthropic => v.pointer("/content/0/text").and_then(|v| v.as_str()),
    };

    text.map(str::to_owned)
        .ok_or_else(|| ImplementerError::Malformed(format!("{provider:?} response has no text")))
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stubsmith/llm.json")
}

fn load_saved() -> Option<ProviderConfig> {
    fs::read_to_string(config_path())
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
}
