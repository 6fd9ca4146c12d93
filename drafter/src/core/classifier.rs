//! Classification of free-text human responses.

/// The only affirmative response; compared trimmed and case-insensitively.
pub const APPROVAL_WORD: &str = "approved";

/// What a human response asks the run to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Accept the artifact and move on.
    Approved,
    /// Regenerate the artifact using the response as feedback.
    Revise,
}

/// Classify a human response.
///
/// - `Approved` if the trimmed text equals `approved` ignoring ASCII case.
/// - `Revise` for anything else, including the empty string.
pub fn classify_response(text: &str) -> Verdict {
    if text.trim().eq_ignore_ascii_case(APPROVAL_WORD) {
        Verdict::Approved
    } else {
        Verdict::Revise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_ignores_case_and_surrounding_whitespace() {
        for text in ["approved", "Approved", " approved ", "APPROVED", "\tapproved\n"] {
            assert_eq!(classify_response(text), Verdict::Approved, "{text:?}");
        }
    }

    #[test]
    fn anything_else_is_revision() {
        for text in ["", "   ", "approve", "approved!", "not approved", "looks good"] {
            assert_eq!(classify_response(text), Verdict::Revise, "{text:?}");
        }
    }
}
