//! Chat completion providers.
//!
//! A provider is a cheap-to-clone builder: messages are appended by value and
//! [`Provider::complete`] consumes the builder and returns the raw reply text.
//! Replies are untrusted; callers validate them.

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod claude;
mod gemini;
mod openai;
mod retry;

pub use claude::Claude;
pub use gemini::Gemini;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
    Claude,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => openai::DEFAULT_MODEL,
            ProviderKind::Gemini => gemini::DEFAULT_MODEL,
            ProviderKind::Claude => claude::DEFAULT_MODEL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

impl ProviderSelection {
    pub fn model(&self) -> String {
        self.requested_model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

/// Encoded image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageData {
    /// Sniffs the mime type from the bytes, falling back to PNG.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or("image/png")
            .to_string();
        Self { bytes, mime }
    }

    pub fn data_url(&self) -> String {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD as BASE64;
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    Image(ImageData),
}

impl Message {
    pub fn system(content: String) -> Self {
        Self::text(MessageRole::System, content)
    }

    pub fn user(content: String) -> Self {
        Self::text(MessageRole::User, content)
    }

    pub fn assistant(content: String) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    pub fn user_image(data: ImageData) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![MessagePart::Image(data)],
        }
    }

    fn text(role: MessageRole, content: String) -> Self {
        Self {
            role,
            parts: vec![MessagePart::Text(content)],
        }
    }

    /// Text parts joined by blank lines; images are skipped.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text(text) => Some(text.as_str()),
                MessagePart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    /// Few-shot example reply.
    fn append_assistant_input(self, input: String) -> Self;
    fn append_user_image(self, data: ImageData) -> Self;
    fn complete(self) -> ProviderFuture;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Gemini(Gemini),
    Claude(Claude),
}

macro_rules! dispatch {
    ($self:ident, $provider:ident => $body:expr) => {
        match $self {
            ProviderImpl::OpenAI($provider) => ProviderImpl::OpenAI($body),
            ProviderImpl::Gemini($provider) => ProviderImpl::Gemini($body),
            ProviderImpl::Claude($provider) => ProviderImpl::Claude($body),
        }
    };
}

impl Provider for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        dispatch!(self, provider => provider.append_system_input(input))
    }

    fn append_user_input(self, input: String) -> Self {
        dispatch!(self, provider => provider.append_user_input(input))
    }

    fn append_assistant_input(self, input: String) -> Self {
        dispatch!(self, provider => provider.append_assistant_input(input))
    }

    fn append_user_image(self, data: ImageData) -> Self {
        dispatch!(self, provider => provider.append_user_image(data))
    }

    fn complete(self) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAI(provider) => provider.complete(),
            ProviderImpl::Gemini(provider) => provider.complete(),
            ProviderImpl::Claude(provider) => provider.complete(),
        }
    }
}

pub fn build_provider(provider: ProviderKind, key: String, model: String) -> ProviderImpl {
    match provider {
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::new(key).with_model(model)),
        ProviderKind::Gemini => ProviderImpl::Gemini(Gemini::new(key).with_model(model)),
        ProviderKind::Claude => ProviderImpl::Claude(Claude::new(key).with_model(model)),
    }
}

pub fn resolve_provider_selection(
    model_arg: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderSelection> {
    match model_arg {
        Some(model) => parse_model_arg(model),
        None => default_provider_selection(override_key),
    }
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key {
        return Ok(key.to_string());
    }
    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
        ProviderKind::Claude => get_env("ANTHROPIC_API_KEY"),
    }
    .ok_or_else(|| anyhow!("API key not found for provider {}", provider.as_str()))
}

fn default_provider_selection(override_key: Option<&str>) -> Result<ProviderSelection> {
    let provider = if get_env("OPENAI_API_KEY").is_some() || override_key.is_some() {
        ProviderKind::OpenAI
    } else if get_env("GEMINI_API_KEY").is_some() || get_env("GOOGLE_API_KEY").is_some() {
        ProviderKind::Gemini
    } else if get_env("ANTHROPIC_API_KEY").is_some() {
        ProviderKind::Claude
    } else {
        return Err(anyhow!(
            "no API keys found (checked OPENAI_API_KEY, GEMINI_API_KEY/GOOGLE_API_KEY, ANTHROPIC_API_KEY)"
        ));
    };
    Ok(ProviderSelection {
        provider,
        requested_model: None,
    })
}

fn parse_model_arg(model_arg: &str) -> Result<ProviderSelection> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }
    if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
        return Ok(ProviderSelection {
            provider,
            requested_model: None,
        });
    }
    let (provider_part, model_part) = raw.split_once(':').ok_or_else(|| {
        anyhow!(
            "unable to infer provider from model '{}'. Use provider:model (openai:, gemini:, claude:)",
            raw
        )
    })?;
    let provider = provider_from_name(&provider_part.to_lowercase())
        .ok_or_else(|| anyhow!("unknown provider '{}'", provider_part))?;
    let model = Some(model_part.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    Ok(ProviderSelection {
        provider,
        requested_model: model,
    })
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" | "google" => Some(ProviderKind::Gemini),
        "claude" | "anthropic" => Some(ProviderKind::Claude),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Joins the non-empty parts of a provider error body.
pub(crate) fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let parts = [
        message,
        kind.map(|kind| format!("type: {}", kind)),
        code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty() && !part.ends_with(": "))
    .collect::<Vec<_>>();
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}
