//! LLM advisor
//!
//! Talks to a locally hosted model (Ollama) for two purposes: a one-shot
//! performance analysis that returns tuning recommendations, and an
//! interactive chat about monitoring thresholds. The model is an external
//! collaborator; every failure is degraded into text for the caller.

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sysinfo::System;
use tracing::{debug, info, warn};

use crate::collector::CollectionReport;
use crate::config::AdvisorConfig;
use crate::error::{AdvisorError, AdvisorResult};
use crate::sampler::Snapshot;
use crate::sections::SectionsCatalog;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat completion seam
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send the conversation and return the assistant reply
    async fn chat(&self, messages: &[ChatMessage]) -> AdvisorResult<String>;

    /// Model identifier, for display
    fn model(&self) -> &str;
}

/// Ollama `/api/chat` client
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaBackend {
    pub fn new(config: &AdvisorConfig) -> AdvisorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Request {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List installed models
    pub async fn health_check(&self) -> AdvisorResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| AdvisorError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AdvisorError::Status { status, body });
        }

        let tags: OllamaTagsResponse = resp
            .json()
            .await
            .map_err(|e| AdvisorError::Decode { reason: e.to_string() })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn chat(&self, messages: &[ChatMessage]) -> AdvisorResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.temperature.map(|temperature| OllamaOptions { temperature }),
        };

        debug!(model = %self.model, messages = messages.len(), "Sending chat request");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdvisorError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AdvisorError::Status { status, body });
        }

        let reply: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| AdvisorError::Decode { reason: e.to_string() })?;

        debug!(response_len = reply.message.content.len(), "Chat request completed");
        Ok(reply.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Risk of applying a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    #[default]
    Medium,
    High,
}

impl Risk {
    /// Unknown values map to `Medium`
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Risk::Low,
            "high" => Risk::High,
            _ => Risk::Medium,
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Low => write!(f, "low"),
            Risk::Medium => write!(f, "medium"),
            Risk::High => write!(f, "high"),
        }
    }
}

impl<'de> Deserialize<'de> for Risk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(Risk::from_str_lossy).unwrap_or_default())
    }
}

/// A tuning recommendation returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub impact: String,
    #[serde(default, deserialize_with = "lenient_commands")]
    pub commands: Vec<String>,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default, deserialize_with = "lenient_string")]
    pub why_hft: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_commands<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(s.lines().map(str::to_string).filter(|l| !l.trim().is_empty()).collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()),
        other => Err(serde::de::Error::custom(format!("unexpected commands value: {}", other))),
    }
}

/// Analysis text plus recommendations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorReply {
    pub analysis: String,
    pub recommendations: Vec<Recommendation>,
}

/// Decode a model reply: full JSON document, then the largest brace span,
/// then free text
pub fn parse_reply(text: &str) -> AdvisorReply {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(object)) => return decode_object(object),
        Ok(_) => debug!("Reply is JSON but not an object"),
        Err(e) => debug!(error = %e, "Reply is not a JSON document"),
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(Value::Object(object)) => return decode_object(object),
            Ok(_) => debug!("Embedded JSON is not an object"),
            Err(e) => debug!(error = %e, "Embedded brace span is not valid JSON"),
        },
        _ => debug!("Reply has no brace span"),
    }

    AdvisorReply {
        analysis: text.to_string(),
        recommendations: Vec::new(),
    }
}

fn decode_object(mut object: serde_json::Map<String, Value>) -> AdvisorReply {
    let analysis = match object.remove("analysis") {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let items = match object.remove("recommendations") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(value = %other, "recommendations is not a list, ignoring");
            Vec::new()
        }
        None => Vec::new(),
    };

    let mut recommendations = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<Recommendation>(item) {
            Ok(mut recommendation) => {
                if recommendation.id.trim().is_empty() {
                    recommendation.id = format!("rec-{}", index + 1);
                }
                recommendations.push(recommendation);
            }
            Err(e) => warn!(index, error = %e, "Skipping malformed recommendation"),
        }
    }

    AdvisorReply {
        analysis,
        recommendations,
    }
}

/// Everything sent to the model for one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub profile: String,
    pub hardware_summary: String,
    pub profile_dump: String,
    pub snapshot: Vec<(String, String)>,
}

impl AnalysisContext {
    pub fn new(
        profile: &str,
        catalog: &SectionsCatalog,
        report: Option<&CollectionReport>,
        snapshot: &Snapshot,
        interface: &str,
    ) -> Self {
        Self {
            profile: profile.to_string(),
            hardware_summary: hardware_summary(interface),
            profile_dump: profile_dump(catalog, report, profile),
            snapshot: snapshot
                .values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
        }
    }

    /// User prompt for the analysis request
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Profile: {}\n", self.profile);
        let _ = writeln!(prompt, "## Hardware summary\n{}\n", self.hardware_summary);
        let _ = writeln!(prompt, "## Collected diagnostics\n{}\n", self.profile_dump);

        if !self.snapshot.is_empty() {
            prompt.push_str("## Current metric values\n");
            for (name, value) in &self.snapshot {
                let _ = writeln!(prompt, "- {}: {}", name, value);
            }
            prompt.push('\n');
        }

        prompt.push_str(ANALYSIS_INSTRUCTIONS);
        prompt
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a Linux performance engineer specialising in \
low-latency, high-frequency trading servers. You review diagnostics and propose safe, \
concrete tuning steps.";

const ANALYSIS_INSTRUCTIONS: &str = r#"Reply with a single JSON object of the form:
{"analysis": "<markdown analysis>", "recommendations": [{"id": "r1", "title": "...", "description": "...", "impact": "...", "commands": ["..."], "risk": "low|medium|high", "why_hft": "..."}]}
Only include commands that can run non-interactively as root."#;

/// Host, OS, CPU, memory and interface summary from sysinfo
pub fn hardware_summary(interface: &str) -> String {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_brand = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let mut summary = String::new();
    let _ = writeln!(summary, "Host: {}", System::host_name().unwrap_or_else(|| "unknown".to_string()));
    let _ = writeln!(summary, "OS: {}", System::long_os_version().unwrap_or_else(|| "unknown".to_string()));
    let _ = writeln!(summary, "Kernel: {}", System::kernel_version().unwrap_or_else(|| "unknown".to_string()));
    let _ = writeln!(summary, "CPU: {} ({} logical cores)", cpu_brand, system.cpus().len());
    let _ = writeln!(summary, "Memory: {:.1} GiB", system.total_memory() as f64 / 1024f64.powi(3));
    let _ = write!(summary, "Primary interface: {}", interface);
    summary
}

/// Command and output pairs for every row of the profile
pub fn profile_dump(catalog: &SectionsCatalog, report: Option<&CollectionReport>, profile: &str) -> String {
    let mut dump = String::new();
    for section in catalog.profile_sections(profile) {
        let _ = write!(dump, "\n=== {} ===\n", section.title);
        for entry in section.entries {
            let collected = report.and_then(|r| r.entry(section.title, &entry.name));
            let command = collected.map_or(entry.command.as_str(), |c| c.command.as_str());
            let output = collected.map(|c| c.output().trim()).filter(|o| !o.is_empty());
            let _ = write!(
                dump,
                "--- {} ---\n{}\n{}\n",
                entry.name,
                command,
                output.unwrap_or("(no output yet)")
            );
        }
    }
    dump.trim().to_string()
}

/// Outcome of [`Advisor::analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub profile: String,
    pub analysis: String,
    pub recommendations: Vec<Recommendation>,
    pub context: AnalysisContext,
    pub generated_at: NaiveDateTime,
    /// Set when the model could not be reached
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn recommendation(&self, id: &str) -> Option<&Recommendation> {
        self.recommendations.iter().find(|r| r.id == id)
    }
}

/// One-shot performance analysis
#[derive(Clone)]
pub struct Advisor {
    backend: Arc<dyn LlmBackend>,
}

impl Advisor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Ask the model for an analysis. Never fails: a collaborator error
    /// becomes the analysis text with no recommendations.
    pub async fn analyze(&self, context: AnalysisContext) -> AnalysisResult {
        let messages = [
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user(context.prompt()),
        ];

        info!(profile = %context.profile, model = self.backend.model(), "Requesting performance analysis");

        let (reply, error) = match self.backend.chat(&messages).await {
            Ok(text) => (parse_reply(&text), None),
            Err(e) => {
                warn!(error = %e, "Performance analysis failed");
                let message = connection_error_message(&e);
                (
                    AdvisorReply {
                        analysis: message.clone(),
                        recommendations: Vec::new(),
                    },
                    Some(e.to_string()),
                )
            }
        };

        info!(recommendations = reply.recommendations.len(), "Analysis complete");

        AnalysisResult {
            profile: context.profile.clone(),
            analysis: reply.analysis,
            recommendations: reply.recommendations,
            context,
            generated_at: Local::now().naive_local(),
            error,
        }
    }
}

fn connection_error_message(error: &AdvisorError) -> String {
    format!(
        "**Ollama connection error**: {}\n\nEnsure `ollama serve` is running and the model is pulled.",
        error
    )
}

/// Threshold section of the chat system prompt
pub fn threshold_context(catalog: &SectionsCatalog, monitored: &[String]) -> String {
    let lines: Vec<String> = monitored
        .iter()
        .filter_map(|name| catalog.metric(name))
        .map(|metric| {
            let unit = if metric.unit.is_empty() { "—" } else { metric.unit.as_str() };
            let min = metric.min.map_or_else(|| "not set".to_string(), |v| format!("{:.4}", v));
            let max = metric.max.map_or_else(|| "not set".to_string(), |v| format!("{:.4}", v));
            format!(
                "- **{}**: unit = {}, current min = {}, current max = {}",
                metric.name, unit, min, max
            )
        })
        .collect();

    if lines.is_empty() {
        return "No metrics currently selected for monitoring — suggestions will be general.".to_string();
    }

    format!(
        "Current monitored metrics (with existing thresholds):\n{}\n\n\
         Focus on safe, practical values for high-performance/low-latency (HFT) servers.",
        lines.join("\n")
    )
}

/// Chat session about monitoring thresholds
pub struct ThresholdChat {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    welcome: String,
    messages: Vec<ChatMessage>,
}

impl ThresholdChat {
    pub fn new(backend: Arc<dyn LlmBackend>, catalog: &SectionsCatalog, monitored: &[String]) -> Self {
        let system_prompt = format!(
            "You are an expert in system performance monitoring for high-performance,\n\
             low-latency servers (especially HFT workloads).\n\n\
             {}\n\n\
             Provide clear, safe threshold recommendations with brief justifications.\n\
             Use markdown (tables, bullets) for readability. Be concise but thorough.",
            threshold_context(catalog, monitored)
        );

        let tailored = if monitored.iter().any(|name| catalog.metric(name).is_some()) {
            "I see your current monitored metrics and thresholds."
        } else {
            "Select metrics in the Monitor section for tailored advice."
        };
        let welcome = format!(
            "Hi! I can suggest safe thresholds, explain metrics, or give optimization tips. {}",
            tailored
        );

        Self {
            backend,
            system_prompt,
            messages: vec![ChatMessage::assistant(welcome.clone())],
            welcome,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Conversation so far, starting with the welcome message
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send a user message and store the reply. A failed request stores a
    /// connection error message as the reply.
    pub async fn send(&mut self, prompt: &str) -> &ChatMessage {
        self.messages.push(ChatMessage::user(prompt));

        let mut request = Vec::with_capacity(self.messages.len() + 1);
        request.push(ChatMessage::system(self.system_prompt.clone()));
        request.extend(self.messages.iter().cloned());

        let reply = match self.backend.chat(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Threshold chat request failed");
                connection_error_message(&e)
            }
        };

        self.messages.push(ChatMessage::assistant(reply));
        &self.messages[self.messages.len() - 1]
    }

    /// Drop the conversation, keeping only the welcome message
    pub fn clear(&mut self) {
        self.messages = vec![ChatMessage::assistant(self.welcome.clone())];
    }
}
