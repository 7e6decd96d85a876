//! Data model for analysis inputs and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keywords::KeywordResult;
use super::stats::TextStats;

/// Origin of an input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Main,
    File,
    Link,
}

/// One titled input text. A document always has a main source and may carry
/// auxiliary file or link sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceText {
    pub id: String,
    pub title: String,
    pub kind: SourceKind,
    pub text: String,
}

/// The unit of analysis: a primary text plus optional auxiliary sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub raw_text: String,
    #[serde(default)]
    pub sources: Vec<SourceText>,
}

impl Document {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            raw_text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(
        mut self,
        title: impl Into<String>,
        kind: SourceKind,
        text: impl Into<String>,
    ) -> Self {
        self.sources.push(SourceText {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            kind,
            text: text.into(),
        });
        self
    }
}

/// A titled slice of the analyzed content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// A recurring theme linked back to the sections that discuss it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: String,
    pub related_section_ids: Vec<String>,
    /// Number of distinct chunks the topic surfaced in.
    pub score: usize,
}

/// How the analysis treated multi-source input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Combined,
    Distributed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingInfo {
    pub mode: ProcessingMode,
    pub elapsed_ms: u64,
    pub backend_available: bool,
    pub timestamp: DateTime<Utc>,
}

/// Complete output of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub keywords: Vec<KeywordResult>,
    pub sections: Vec<Section>,
    pub topics: Vec<Topic>,
    pub stats: TextStats,
    pub processing: ProcessingInfo,
}
