//! Interactive terminal loop: show each interrupt, read a reply, resume.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

use crate::core::document::{is_fully_drafted, render_document};
use crate::core::interrupt::InterruptPayload;
use crate::core::types::RunState;
use crate::graph::{Orchestrator, RunEvent, RunInput, RunOutcome};
use crate::io::checkpoint::CheckpointStore;
use crate::io::llm::TextGenerator;

const COMPLETED_MARK: &str = "✅";
const PENDING_MARK: &str = "⬜";

/// Drive `run_id` from `state` to completion, talking to a human over
/// `input`/`out`. Returns the final state.
pub fn drive<G, S, R, W>(
    orchestrator: &Orchestrator<G, S>,
    run_id: &str,
    state: RunState,
    mut input: R,
    out: &mut W,
) -> Result<RunState>
where
    G: TextGenerator,
    S: CheckpointStore,
    R: BufRead,
    W: Write,
{
    let mut next_input = RunInput::Start(state);
    loop {
        let mut progress = Ok(());
        let outcome = orchestrator.run(next_input, run_id, |event| {
            if let RunEvent::Update { node, .. } = event
                && progress.is_ok()
            {
                progress = writeln!(out, "  · {node}");
            }
        })?;
        progress?;

        match outcome {
            RunOutcome::Completed { state } => {
                writeln!(out, "\nBlog draft complete.\n")?;
                if !is_fully_drafted(&state) {
                    writeln!(out, "The outline has no drafted sections.")?;
                }
                write!(out, "{}", render_document(&state))?;
                out.flush()?;
                return Ok(state);
            }
            RunOutcome::Interrupted { payload, .. } => {
                let completed = orchestrator
                    .checkpoint(run_id)?
                    .map(|checkpoint| checkpoint.state)
                    .unwrap_or_default();
                write!(out, "{}", render_payload(&payload, &completed))?;
                write!(out, "> ")?;
                out.flush()?;

                let mut line = String::new();
                let read = input.read_line(&mut line).context("read feedback")?;
                if read == 0 {
                    bail!("input closed while waiting for feedback on run '{run_id}'");
                }
                next_input = RunInput::Resume(line.trim_end_matches(['\r', '\n']).to_string());
            }
        }
    }
}

/// Human-readable view of an interrupt payload.
pub fn render_payload(payload: &InterruptPayload, state: &RunState) -> String {
    let mut buf = String::new();
    match payload {
        InterruptPayload::HumanBlogFeedback {
            sections,
            blog_structuring_version,
            message,
        } => {
            buf.push_str(&format!(
                "\nProposed outline (version {blog_structuring_version}):\n"
            ));
            for section in sections {
                buf.push_str(&format!(
                    "  {}. {}\n     {}\n",
                    section.no, section.title, section.description
                ));
            }
            buf.push_str(&format!("\n{message}\n"));
        }
        InterruptPayload::HumanSectionFeedback {
            section_no,
            section_title,
            section_description,
            section_draft,
            draft_version,
            message,
        } => {
            buf.push_str(&format!("\n{}\n", progress_bar(state)));
            buf.push_str(&format!(
                "\nSection {section_no}: {section_title} (draft {draft_version})\n{section_description}\n\n{section_draft}\n\n{message}\n"
            ));
        }
    }
    buf
}

/// One mark per section: approved sections are checked.
pub fn progress_bar(state: &RunState) -> String {
    let marks: String = state
        .sections
        .iter()
        .map(|section| {
            if state.completed_sections.contains(&section.no) {
                COMPLETED_MARK
            } else {
                PENDING_MARK
            }
        })
        .collect();
    format!(
        "{marks} {}/{} sections approved",
        state.completed_sections.len(),
        state.sections.len()
    )
}
