//! Request payload sent to the generation backend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Off,
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Off,
    #[default]
    Auto,
    Concise,
    Detailed,
}

/// One generation or refine request.
///
/// A refine request is an ordinary request that carries the thread id of the
/// conversation being revised; the backend answers from that thread's context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub message: String,
    pub platforms: Vec<String>,
    pub content_type: String,
    pub language: String,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    #[serde(default)]
    pub reasoning_summary: ReasoningSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Ask for two content variants for A/B comparison.
    #[serde(default)]
    pub ab_mode: bool,
}

impl GenerateRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            platforms: vec!["linkedin".to_string()],
            content_type: "post".to_string(),
            language: "en".to_string(),
            reasoning_effort: ReasoningEffort::default(),
            reasoning_summary: ReasoningSummary::default(),
            thread_id: None,
            ab_mode: false,
        }
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_reasoning(mut self, effort: ReasoningEffort, summary: ReasoningSummary) -> Self {
        self.reasoning_effort = effort;
        self.reasoning_summary = summary;
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_ab_mode(mut self, ab_mode: bool) -> Self {
        self.ab_mode = ab_mode;
        self
    }

    /// Follow-up request that revises the content of `thread_id` using
    /// `feedback`, keeping this request's settings.
    pub fn refine(&self, thread_id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            message: feedback.into(),
            thread_id: Some(thread_id.into()),
            ..self.clone()
        }
    }

    pub fn is_refine(&self) -> bool {
        self.thread_id.is_some()
    }
}
