//! Node identifiers and the static edges between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::RunState;

/// A step in the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    CodeUnderstanding,
    BlogStructuring,
    HumanBlogFeedback,
    SetNextSection,
    SectionDrafting,
    SectionDraftingFeedback,
}

impl NodeId {
    /// Every run starts here.
    pub const ENTRY: NodeId = NodeId::CodeUnderstanding;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeUnderstanding => "code_understanding",
            Self::BlogStructuring => "blog_structuring",
            Self::HumanBlogFeedback => "human_blog_feedback",
            Self::SetNextSection => "set_next_section",
            Self::SectionDrafting => "section_drafting",
            Self::SectionDraftingFeedback => "section_drafting_feedback",
        }
    }

    /// True for nodes that pause for human input.
    pub fn is_interrupt_point(self) -> bool {
        matches!(self, Self::HumanBlogFeedback | Self::SectionDraftingFeedback)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing edge of a node when the step itself does not choose a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Always continue to this node.
    To(NodeId),
    /// Decided from state by [`route_after_set_next_section`].
    Conditional,
    /// The step must name its successor (feedback nodes).
    StepChooses,
}

/// Static graph shape:
///
/// ```text
/// code_understanding -> blog_structuring -> human_blog_feedback
/// human_blog_feedback -> blog_structuring | set_next_section       (step chooses)
/// set_next_section -> section_drafting | END                       (conditional)
/// section_drafting -> section_drafting_feedback
/// section_drafting_feedback -> section_drafting | set_next_section (step chooses)
/// ```
pub fn edge_from(node: NodeId) -> Edge {
    match node {
        NodeId::CodeUnderstanding => Edge::To(NodeId::BlogStructuring),
        NodeId::BlogStructuring => Edge::To(NodeId::HumanBlogFeedback),
        NodeId::SectionDrafting => Edge::To(NodeId::SectionDraftingFeedback),
        NodeId::SetNextSection => Edge::Conditional,
        NodeId::HumanBlogFeedback | NodeId::SectionDraftingFeedback => Edge::StepChooses,
    }
}

/// Continue drafting while a target section is set; otherwise the run ends.
pub fn route_after_set_next_section(state: &RunState) -> Option<NodeId> {
    match state.target_section_no.as_deref() {
        Some(no) if !no.is_empty() => Some(NodeId::SectionDrafting),
        _ => None,
    }
}
