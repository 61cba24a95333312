//! Outcome reported by pipeline stages alongside their output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`PipelineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatusType {
    #[default]
    Success,
    /// Evaluation is still in progress. Only used for stage status reporting.
    Pending,
    Warning,
    Error,
}

impl StatusType {
    /// Rank used when merging statuses. Higher wins.
    pub fn severity(self) -> u8 {
        match self {
            StatusType::Success => 0,
            StatusType::Pending => 1,
            StatusType::Warning => 2,
            StatusType::Error => 3,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StatusType::Success => "Success",
            StatusType::Pending => "Pending",
            StatusType::Warning => "Warning",
            StatusType::Error => "Error",
        }
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Status code plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    status_type: StatusType,
    text: String,
}

impl PipelineStatus {
    pub fn new(status_type: StatusType, text: impl Into<String>) -> Self {
        Self {
            status_type,
            text: text.into(),
        }
    }

    pub fn success() -> Self {
        Self::default()
    }

    pub fn success_with(text: impl Into<String>) -> Self {
        Self::new(StatusType::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(StatusType::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(StatusType::Error, text)
    }

    pub fn pending(text: impl Into<String>) -> Self {
        Self::new(StatusType::Pending, text)
    }

    pub fn status_type(&self) -> StatusType {
        self.status_type
    }

    pub fn set_type(&mut self, status_type: StatusType) {
        self.status_type = status_type;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_error(&self) -> bool {
        self.status_type == StatusType::Error
    }

    /// Fold `other` into this status.
    ///
    /// The resulting type is the more severe of the two. Non-empty texts are
    /// joined with a newline, in merge order, so no message is ever dropped.
    pub fn merge(&mut self, other: &PipelineStatus) {
        if other.status_type.severity() > self.status_type.severity() {
            self.status_type = other.status_type;
        }
        if !other.text.is_empty() {
            if self.text.is_empty() {
                self.text = other.text.clone();
            } else {
                self.text.push('\n');
                self.text.push_str(&other.text);
            }
        }
    }

    pub fn merged(mut self, other: &PipelineStatus) -> Self {
        self.merge(other);
        self
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.status_type)
        } else {
            write!(f, "{}: {}", self.status_type, self.text)
        }
    }
}
