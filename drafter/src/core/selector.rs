//! Deterministic selection of the next section to draft.

use crate::core::types::{RunState, Section, section_key};

/// Find the first section, in outline order, that has no draft yet.
///
/// Returns `None` when every section has a draft (or the outline is empty).
pub fn next_undrafted_section(state: &RunState) -> Option<&Section> {
    state
        .sections
        .iter()
        .find(|section| !state.section_drafts.contains_key(&section_key(&section.no)))
}
