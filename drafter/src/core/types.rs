//! Typed run state threaded through every step.
//!
//! These types are the contract between steps, the orchestrator and the
//! driver. They carry no I/O and serialize to stable JSON so checkpoints can be
//! inspected by hand.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feedback channel for the outline checkpoint.
pub const OUTLINE_CHANNEL: &str = "blog_structuring";

/// Feedback channel for one section's draft checkpoint.
pub fn section_channel(no: &str) -> String {
    format!("section_drafting_{no}")
}

/// Key under which a section's draft is stored in `section_drafts`.
pub fn section_key(no: &str) -> String {
    format!("section{no}")
}

/// One titled, described unit of the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// 1-based ordinal, stringified.
    pub no: String,
    pub title: String,
    pub description: String,
}

/// Section as proposed by the model, before numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOutline {
    pub title: String,
    pub description: String,
}

/// Structured output expected from the outline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineOutput {
    pub sections: Vec<SectionOutline>,
}

/// Assign `no` = 1-based position to each proposed section.
pub fn number_sections(outline: Vec<SectionOutline>) -> Vec<Section> {
    outline
        .into_iter()
        .enumerate()
        .map(|(idx, section)| Section {
            no: (idx + 1).to_string(),
            title: section.title,
            description: section.description,
        })
        .collect()
}

/// Last human response on one channel and how many times it was collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    pub text: String,
    pub version: u32,
}

/// Feedback history keyed by channel.
///
/// Serialized as a flat map: `<channel>` holds the text and
/// `<channel>_version` holds the counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, Value>",
    try_from = "BTreeMap<String, Value>"
)]
pub struct FeedbackLog {
    channels: BTreeMap<String, Feedback>,
}

const VERSION_SUFFIX: &str = "_version";

impl FeedbackLog {
    pub fn text(&self, channel: &str) -> Option<&str> {
        self.channels.get(channel).map(|f| f.text.as_str())
    }

    /// Number of interrupt cycles recorded on `channel` (0 if never).
    pub fn version(&self, channel: &str) -> u32 {
        self.channels.get(channel).map_or(0, |f| f.version)
    }

    /// Store `text` as the latest response on `channel` and bump its version.
    ///
    /// Returns the new version.
    pub fn record(&mut self, channel: &str, text: impl Into<String>) -> u32 {
        let entry = self.channels.entry(channel.to_string()).or_default();
        entry.text = text.into();
        entry.version += 1;
        entry.version
    }
}

impl From<FeedbackLog> for BTreeMap<String, Value> {
    fn from(log: FeedbackLog) -> Self {
        let mut flat = BTreeMap::new();
        for (channel, feedback) in log.channels {
            flat.insert(
                format!("{channel}{VERSION_SUFFIX}"),
                Value::from(feedback.version),
            );
            flat.insert(channel, Value::String(feedback.text));
        }
        flat
    }
}

impl TryFrom<BTreeMap<String, Value>> for FeedbackLog {
    type Error = String;

    fn try_from(flat: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut channels: BTreeMap<String, Feedback> = BTreeMap::new();
        for (key, value) in &flat {
            if let Value::String(text) = value {
                channels.entry(key.clone()).or_default().text = text.clone();
            }
        }
        for (key, value) in flat {
            match value {
                Value::String(_) => {}
                Value::Number(n) => {
                    let channel = key
                        .strip_suffix(VERSION_SUFFIX)
                        .ok_or_else(|| format!("feedback key '{key}' has a numeric value"))?;
                    let version = n
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| format!("feedback key '{key}' is not a valid version"))?;
                    channels.entry(channel.to_string()).or_default().version = version;
                }
                other => return Err(format!("feedback key '{key}' has unsupported value {other}")),
            }
        }
        Ok(Self { channels })
    }
}

/// Accumulated data for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    /// Concatenated source text to summarize. Never modified by steps.
    pub code: String,
    pub code_summary: String,
    /// Current outline. Replaced wholesale whenever the outline is regenerated.
    pub sections: Vec<Section>,
    /// Latest draft per section, keyed by [`section_key`].
    pub section_drafts: BTreeMap<String, String>,
    /// Section numbers approved by the human, in approval order.
    pub completed_sections: Vec<String>,
    /// Section being drafted; `None` once every section has a draft.
    pub target_section_no: Option<String>,
    pub feedback: FeedbackLog,
}

impl RunState {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn section(&self, no: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.no == no)
    }

    pub fn draft(&self, no: &str) -> Option<&str> {
        self.section_drafts.get(&section_key(no)).map(String::as_str)
    }
}

/// A step was invoked without the state it requires.
///
/// Precondition failures abort the run and are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionError {
    pub message: String,
}

impl PreconditionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "precondition failed: {}", self.message)
    }
}

impl std::error::Error for PreconditionError {}

/// Shorthand for returning a [`PreconditionError`] through `anyhow`.
pub fn precondition<T>(message: impl Into<String>) -> Result<T> {
    Err(anyhow!(PreconditionError::new(message)))
}
