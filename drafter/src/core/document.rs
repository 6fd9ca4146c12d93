//! Rendering of the finished document.

use crate::core::types::RunState;

/// Render the outline and drafts as Markdown, in section order.
///
/// Sections without a draft get a placeholder so partial runs stay readable.
pub fn render_document(state: &RunState) -> String {
    let mut buf = String::new();
    for section in &state.sections {
        buf.push_str(&format!("## {}. {}\n\n", section.no, section.title));
        match state.draft(&section.no) {
            Some(draft) => buf.push_str(draft.trim()),
            None => buf.push_str("_(not drafted)_"),
        }
        buf.push_str("\n\n");
    }
    buf
}

/// True once every section in a non-empty outline has a draft.
pub fn is_fully_drafted(state: &RunState) -> bool {
    !state.sections.is_empty()
        && state
            .sections
            .iter()
            .all(|section| state.draft(&section.no).is_some())
}
