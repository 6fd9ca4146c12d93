//! Semantic invariants of a run state.

use std::collections::HashSet;

use crate::core::types::{RunState, section_key};

/// Check run state invariants:
/// - Section numbers are `"1".."n"` in outline order (unique, dense, 1-based)
/// - Every draft key belongs to a known section
/// - `target_section_no`, when set, names a known section
/// - Every completed section is known and has a draft
pub fn validate_invariants(state: &RunState) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for (idx, section) in state.sections.iter().enumerate() {
        let expected = (idx + 1).to_string();
        if section.no != expected {
            errors.push(format!(
                "sections[{idx}]: number '{}' should be '{expected}'",
                section.no
            ));
        }
        if !seen.insert(section.no.as_str()) {
            errors.push(format!("duplicate section number '{}'", section.no));
        }
    }

    let known_keys: HashSet<String> = state
        .sections
        .iter()
        .map(|section| section_key(&section.no))
        .collect();
    for key in state.section_drafts.keys() {
        if !known_keys.contains(key) {
            errors.push(format!("draft '{key}' has no matching section"));
        }
    }

    if let Some(target) = &state.target_section_no
        && state.section(target).is_none()
    {
        errors.push(format!("target section '{target}' is not in the outline"));
    }

    for no in &state.completed_sections {
        if state.section(no).is_none() {
            errors.push(format!("completed section '{no}' is not in the outline"));
        } else if state.draft(no).is_none() {
            errors.push(format!("completed section '{no}' has no draft"));
        }
    }

    errors
}
