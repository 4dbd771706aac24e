use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::env;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::models::{Message, ROLE_NOT_SPECIFIED, Status, UNKNOWN_EMPLOYER};

/// Characters of body text included in the extraction prompt.
pub const PROMPT_BODY_CHARS: usize = 2000;
const EXTRACTION_MAX_TOKENS: u32 = 256;
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0} is not reachable")]
    Unavailable(String),
    #[error("failed to reach {provider}: {reason}")]
    Connection { provider: String, reason: String },
    #[error("{provider} request timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
    #[error("{0} environment variable not set. Set it with: export {0}=your-key-here")]
    MissingKey(&'static str),
}

// --- Provider trait ---

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AiError>;
    fn is_available(&self) -> bool;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    Anthropic,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            _ => Err(anyhow!(
                "Unknown AI provider '{}'. Available: ollama (default), anthropic",
                s
            )),
        }
    }
}

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-haiku-4-5-20251001";

/// Maps short model names to provider model ids.
pub fn resolve_model(kind: ProviderKind, name: &str) -> String {
    match kind {
        ProviderKind::Ollama => name.to_string(),
        ProviderKind::Anthropic => match name {
            "haiku" | "claude-haiku" => DEFAULT_ANTHROPIC_MODEL.to_string(),
            "sonnet" | "claude-sonnet" => "claude-sonnet-4-5-20250929".to_string(),
            id if id.starts_with("claude-") => id.to_string(),
            other => {
                warn!(model = other, "not an Anthropic model, using {DEFAULT_ANTHROPIC_MODEL}");
                DEFAULT_ANTHROPIC_MODEL.to_string()
            }
        },
    }
}

pub fn create_provider(config: &AiConfig) -> anyhow::Result<Box<dyn AIProvider>> {
    let kind: ProviderKind = config.provider.parse()?;
    let model_id = resolve_model(kind, &config.model);
    match kind {
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(config, model_id)?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(
            model_id,
            config.timeout_secs,
        )?)),
    }
}

fn build_client(provider: &str, timeout_secs: u64) -> Result<reqwest::blocking::Client, AiError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AiError::Connection {
            provider: provider.to_string(),
            reason: e.to_string(),
        })
}

fn transport_error(provider: &str, timeout_secs: u64, err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout {
            provider: provider.to_string(),
            seconds: timeout_secs,
        }
    } else {
        AiError::Connection {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }
}

// --- Ollama provider ---

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

/// Local model served by Ollama. Timeouts are retried; other failures are not.
#[derive(Debug)]
pub struct OllamaProvider {
    host: String,
    model_id: String,
    timeout_secs: u64,
    max_retries: u32,
    retry_delay: Duration,
    client: reqwest::blocking::Client,
    available: OnceCell<bool>,
}

impl OllamaProvider {
    pub fn new(config: &AiConfig, model_id: String) -> Result<Self, AiError> {
        let host = config.host.trim_end_matches('/').to_string();
        let client = build_client(&host, config.timeout_secs)?;
        Ok(Self {
            host,
            model_id,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            client,
            available: OnceCell::new(),
        })
    }

    fn provider_label(&self) -> String {
        format!("Ollama at {}", self.host)
    }
}

impl AIProvider for OllamaProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AiError> {
        if !self.is_available() {
            return Err(AiError::Unavailable(self.provider_label()));
        }

        let request = OllamaRequest {
            model: &self.model_id,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: max_tokens,
            },
        };
        let url = format!("{}/api/generate", self.host);

        let mut attempt = 0;
        loop {
            match self.client.post(&url).json(&request).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let body = response.text().unwrap_or_default();
                        return Err(AiError::Status {
                            provider: self.provider_label(),
                            status,
                            body,
                        });
                    }
                    let parsed: OllamaResponse =
                        response.json().map_err(|e| AiError::InvalidResponse {
                            provider: self.provider_label(),
                            reason: e.to_string(),
                        })?;
                    return Ok(parsed.response);
                }
                Err(e) if e.is_timeout() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, model = %self.model_id, "Ollama request timed out, retrying");
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(transport_error(&self.provider_label(), self.timeout_secs, e)),
            }
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = self
                .client
                .get(format!("{}/api/tags", self.host))
                .timeout(AVAILABILITY_TIMEOUT)
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            debug!(host = %self.host, available = ok, "checked Ollama availability");
            ok
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String, timeout_secs: u64) -> Result<Self, AiError> {
        let api_key =
            env::var("ANTHROPIC_API_KEY").map_err(|_| AiError::MissingKey("ANTHROPIC_API_KEY"))?;
        let client = build_client("Anthropic API", timeout_secs)?;
        Ok(Self {
            api_key,
            model_id,
            timeout_secs,
            client,
        })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AiError> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| transport_error("Anthropic API", self.timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(AiError::Status {
                provider: "Anthropic API".to_string(),
                status,
                body,
            });
        }

        let api_response: AnthropicResponse =
            response.json().map_err(|e| AiError::InvalidResponse {
                provider: "Anthropic API".to_string(),
                reason: e.to_string(),
            })?;

        api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| AiError::InvalidResponse {
                provider: "Anthropic API".to_string(),
                reason: "no content blocks".to_string(),
            })
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Message extraction ---

/// Fields the collaborator extracted from one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiExtraction {
    pub employer: String,
    pub role: String,
    pub status: Status,
}

pub fn extraction_prompt(message: &Message) -> String {
    let body: String = message.text_body().chars().take(PROMPT_BODY_CHARS).collect();
    format!(
        "You classify emails about job applications.\n\
        Read the email below and reply with a single JSON object, nothing else.\n\n\
        From: {sender}\n\
        Subject: {subject}\n\
        Body:\n{body}\n\n\
        Fields:\n\
        - company_name: the hiring company (\"{UNKNOWN_EMPLOYER}\" if you cannot tell)\n\
        - position: the job title (\"{ROLE_NOT_SPECIFIED}\" if not mentioned)\n\
        - status: exactly one of \"Applied\", \"Interviewing\", \"Rejected\", \"Offer\"\n\n\
        Applied = application received. Interviewing = interview, screen or next steps requested.\n\
        Rejected = not moving forward. Offer = job offer extended.\n\n\
        Example: {{\"company_name\": \"Acme\", \"position\": \"Data Engineer\", \"status\": \"Applied\"}}\n\
        JSON:",
        sender = message.sender,
        subject = message.subject,
    )
}

pub fn ai_extract(provider: &dyn AIProvider, message: &Message) -> Result<AiExtraction, AiError> {
    let prompt = extraction_prompt(message);
    let response = provider.complete(&prompt, EXTRACTION_MAX_TOKENS)?;
    parse_extraction(&response).ok_or_else(|| AiError::InvalidResponse {
        provider: provider.model_name().to_string(),
        reason: "no JSON object found in response".to_string(),
    })
}

static JSON_CANDIDATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?is)\{[^{}]*"company_name"[^{}]*\}"#,
        r#"(?is)\{[^{}]*"company"[^{}]*\}"#,
        r"(?is)```(?:json)?\s*(\{.*?\})\s*```",
        r"(?s)\{.*?\}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn find_json_object(response: &str) -> Option<Map<String, Value>> {
    let embedded = JSON_CANDIDATES.iter().find_map(|re| {
        let caps = re.captures(response)?;
        let text = caps.get(1).or_else(|| caps.get(0))?.as_str();
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    });
    embedded.or_else(|| match serde_json::from_str::<Value>(response.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    })
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k)?.as_str())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pulls the first usable JSON object out of a model response. Missing
/// fields fall back to the usual placeholders.
pub fn parse_extraction(response: &str) -> Option<AiExtraction> {
    let map = find_json_object(response)?;
    Some(AiExtraction {
        employer: text_field(&map, &["company_name", "company"])
            .unwrap_or_else(|| UNKNOWN_EMPLOYER.to_string()),
        role: text_field(&map, &["position", "job_title"])
            .unwrap_or_else(|| ROLE_NOT_SPECIFIED.to_string()),
        status: text_field(&map, &["status"])
            .map(|s| Status::normalize(&s))
            .unwrap_or(Status::Applied),
    })
}
