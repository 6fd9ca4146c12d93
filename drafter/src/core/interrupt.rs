//! Cooperative suspension of a step pending human input.
//!
//! A step calls [`Interrupt::suspend`] with the payload a reviewer needs. On
//! first execution there is no resume value, so `suspend` fails with
//! [`Suspended`]; the orchestrator catches it, checkpoints the node as the
//! resume point and hands the payload to the driver. When the driver resumes,
//! the same step runs again from the top and `suspend` returns the human's
//! text instead. Anything a step does before its suspension point therefore
//! runs twice and must be side-effect free.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::node::NodeId;
use crate::core::types::Section;

/// What the human reviewer is shown, tagged by `current_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "current_node", rename_all = "snake_case")]
pub enum InterruptPayload {
    HumanBlogFeedback {
        sections: Vec<Section>,
        blog_structuring_version: u32,
        message: String,
    },
    HumanSectionFeedback {
        section_no: String,
        section_title: String,
        section_description: String,
        section_draft: String,
        draft_version: u32,
        message: String,
    },
}

impl InterruptPayload {
    pub fn message(&self) -> &str {
        match self {
            Self::HumanBlogFeedback { message, .. } | Self::HumanSectionFeedback { message, .. } => {
                message
            }
        }
    }

    /// Version the pending response will be recorded under.
    pub fn version(&self) -> u32 {
        match self {
            Self::HumanBlogFeedback {
                blog_structuring_version,
                ..
            } => *blog_structuring_version,
            Self::HumanSectionFeedback { draft_version, .. } => *draft_version,
        }
    }
}

/// A step paused at its suspension point. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspended {
    pub node: NodeId,
    pub payload: InterruptPayload,
}

impl fmt::Display for Suspended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} is waiting for human input", self.node)
    }
}

impl std::error::Error for Suspended {}

/// Per-execution suspension handle for one step.
#[derive(Debug, Clone)]
pub struct Interrupt {
    node: NodeId,
    resume: Option<String>,
}

impl Interrupt {
    pub fn new(node: NodeId, resume: Option<String>) -> Self {
        Self { node, resume }
    }

    /// Return the resume value if one was supplied; otherwise suspend with `payload`.
    pub fn suspend(&mut self, payload: InterruptPayload) -> Result<String> {
        match self.resume.take() {
            Some(value) => Ok(value),
            None => Err(Suspended {
                node: self.node,
                payload,
            }
            .into()),
        }
    }

    /// True if a resume value is waiting to be consumed.
    pub fn has_resume_value(&self) -> bool {
        self.resume.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline_payload(version: u32) -> InterruptPayload {
        InterruptPayload::HumanBlogFeedback {
            sections: Vec::new(),
            blog_structuring_version: version,
            message: "review".to_string(),
        }
    }

    #[test]
    fn suspend_without_resume_value_raises_suspended() {
        let mut interrupt = Interrupt::new(NodeId::HumanBlogFeedback, None);
        let err = interrupt.suspend(outline_payload(1)).unwrap_err();
        let suspended = err.downcast_ref::<Suspended>().expect("suspended");
        assert_eq!(suspended.node, NodeId::HumanBlogFeedback);
        assert_eq!(suspended.payload.version(), 1);
    }

    #[test]
    fn suspend_returns_resume_value_once() {
        let mut interrupt = Interrupt::new(NodeId::HumanBlogFeedback, Some("approved".into()));
        assert!(interrupt.has_resume_value());
        assert_eq!(interrupt.suspend(outline_payload(1)).expect("resume"), "approved");
        assert!(interrupt.suspend(outline_payload(1)).is_err());
    }

    #[test]
    fn payload_serializes_with_current_node_tag() {
        let payload = InterruptPayload::HumanSectionFeedback {
            section_no: "2".to_string(),
            section_title: "Design".to_string(),
            section_description: "How it fits".to_string(),
            section_draft: "Draft text".to_string(),
            draft_version: 3,
            message: "review".to_string(),
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["current_node"], "human_section_feedback");
        assert_eq!(value["draft_version"], 3);

        let outline = serde_json::to_value(outline_payload(1)).expect("serialize");
        assert_eq!(outline["current_node"], "human_blog_feedback");
        assert_eq!(outline["blog_structuring_version"], 1);
    }
}
