//! The six pipeline steps.
//!
//! Each step reads the state it needs, validates it at entry, and returns a
//! new state plus an optional routing override. Steps never persist anything;
//! the orchestrator checkpoints whatever they return.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::classifier::{Verdict, classify_response};
use crate::core::interrupt::{Interrupt, InterruptPayload};
use crate::core::node::NodeId;
use crate::core::selector::next_undrafted_section;
use crate::core::types::{
    OUTLINE_CHANNEL, OutlineOutput, RunState, Section, number_sections, precondition,
    section_channel, section_key,
};
use crate::io::llm::{OutputSchema, TextGenerator, generate, generate_structured};
use crate::io::prompt::{DraftPromptInput, PromptEngine};
use crate::io::retry::RetryPolicy;

pub const OUTLINE_FEEDBACK_MESSAGE: &str =
    "Provide feedback on the blog structure (or type 'approved')";
pub const SECTION_FEEDBACK_MESSAGE: &str =
    "Please review the drafted section and provide feedback, or type 'approved' to proceed.";

/// Collaborators shared by every step of a run.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub generator: &'a dyn TextGenerator,
    pub prompts: &'a PromptEngine,
    pub outline_schema: &'a OutputSchema,
    pub retry: &'a RetryPolicy,
}

/// What a step hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub state: RunState,
    /// Successor chosen by the step; `None` follows the static edge.
    pub goto: Option<NodeId>,
}

impl StepOutput {
    fn next(state: RunState) -> Self {
        Self { state, goto: None }
    }

    fn goto(state: RunState, node: NodeId) -> Self {
        Self {
            state,
            goto: Some(node),
        }
    }
}

/// Execute `node` against `state`.
pub fn run_node(
    node: NodeId,
    state: &RunState,
    ctx: &StepContext<'_>,
    interrupt: &mut Interrupt,
) -> Result<StepOutput> {
    match node {
        NodeId::CodeUnderstanding => code_understanding(state, ctx),
        NodeId::BlogStructuring => blog_structuring(state, ctx),
        NodeId::HumanBlogFeedback => human_blog_feedback(state, interrupt),
        NodeId::SetNextSection => Ok(set_next_section(state)),
        NodeId::SectionDrafting => section_drafting(state, ctx),
        NodeId::SectionDraftingFeedback => section_drafting_feedback(state, interrupt),
    }
}

pub fn code_understanding(state: &RunState, ctx: &StepContext<'_>) -> Result<StepOutput> {
    if state.code.trim().is_empty() {
        return precondition("code understanding needs non-empty code");
    }
    let messages = ctx.prompts.code_understanding(&state.code)?;
    let summary = generate(ctx.generator, &messages, ctx.retry)?;
    info!(chars = summary.len(), "code summarized");
    Ok(StepOutput::next(RunState {
        code_summary: summary,
        ..state.clone()
    }))
}

/// Propose (or revise) the outline. The section list is replaced, never merged.
pub fn blog_structuring(state: &RunState, ctx: &StepContext<'_>) -> Result<StepOutput> {
    if state.code_summary.trim().is_empty() {
        return precondition("blog structuring needs a code summary");
    }
    let messages = ctx.prompts.blog_structuring(
        &state.code_summary,
        &state.sections,
        state.feedback.text(OUTLINE_CHANNEL),
    )?;
    let outline: OutlineOutput =
        generate_structured(ctx.generator, &messages, ctx.outline_schema, ctx.retry)?;
    let sections = number_sections(outline.sections);
    info!(sections = sections.len(), "outline generated");
    Ok(StepOutput::next(RunState {
        sections,
        ..state.clone()
    }))
}

pub fn human_blog_feedback(state: &RunState, interrupt: &mut Interrupt) -> Result<StepOutput> {
    let version = state.feedback.version(OUTLINE_CHANNEL) + 1;
    let response = interrupt.suspend(InterruptPayload::HumanBlogFeedback {
        sections: state.sections.clone(),
        blog_structuring_version: version,
        message: OUTLINE_FEEDBACK_MESSAGE.to_string(),
    })?;
    info!(version, "outline feedback received");

    let mut next = state.clone();
    next.feedback.record(OUTLINE_CHANNEL, response.as_str());
    let goto = match classify_response(&response) {
        Verdict::Approved => NodeId::SetNextSection,
        Verdict::Revise => NodeId::BlogStructuring,
    };
    Ok(StepOutput::goto(next, goto))
}

/// Point `target_section_no` at the first section without a draft, or clear it.
pub fn set_next_section(state: &RunState) -> StepOutput {
    let target = next_undrafted_section(state).map(|section| section.no.clone());
    match &target {
        Some(no) => info!(section = %no, "next section selected"),
        None => info!("all sections drafted"),
    }
    StepOutput::next(RunState {
        target_section_no: target,
        ..state.clone()
    })
}

fn target_section(state: &RunState) -> Result<&Section> {
    let no = match state.target_section_no.as_deref() {
        Some(no) if !no.is_empty() => no,
        _ => return precondition("no target section is set"),
    };
    match state.section(no) {
        Some(section) => Ok(section),
        None => precondition(format!("no section numbered '{no}' in the outline")),
    }
}

pub fn section_drafting(state: &RunState, ctx: &StepContext<'_>) -> Result<StepOutput> {
    let section = target_section(state)?;
    let channel = section_channel(&section.no);
    let messages = ctx.prompts.section_drafting(DraftPromptInput {
        section,
        code_summary: &state.code_summary,
        previous_draft: state.draft(&section.no),
        feedback: state.feedback.text(&channel),
    })?;
    let draft = generate(ctx.generator, &messages, ctx.retry)?;
    info!(section = %section.no, chars = draft.len(), "section drafted");

    let mut next = state.clone();
    next.section_drafts.insert(section_key(&section.no), draft);
    Ok(StepOutput::next(next))
}

pub fn section_drafting_feedback(
    state: &RunState,
    interrupt: &mut Interrupt,
) -> Result<StepOutput> {
    let section = target_section(state)?;
    let Some(draft) = state.draft(&section.no) else {
        return precondition(format!("section '{}' has no draft to review", section.no));
    };
    let channel = section_channel(&section.no);
    let version = state.feedback.version(&channel) + 1;
    let response = interrupt.suspend(InterruptPayload::HumanSectionFeedback {
        section_no: section.no.clone(),
        section_title: section.title.clone(),
        section_description: section.description.clone(),
        section_draft: draft.to_string(),
        draft_version: version,
        message: SECTION_FEEDBACK_MESSAGE.to_string(),
    })?;
    info!(section = %section.no, version, "section feedback received");

    let no = section.no.clone();
    let mut next = state.clone();
    next.feedback.record(&channel, response.as_str());
    match classify_response(&response) {
        Verdict::Approved => {
            if !next.completed_sections.contains(&no) {
                next.completed_sections.push(no);
            }
            Ok(StepOutput::goto(next, NodeId::SetNextSection))
        }
        Verdict::Revise => {
            debug!(section = %no, "redrafting with feedback");
            Ok(StepOutput::goto(next, NodeId::SectionDrafting))
        }
    }
}
