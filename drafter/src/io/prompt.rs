//! Prompt rendering for the generation steps.
//!
//! Each template holds `<!-- role:system -->` / `<!-- role:user -->` markers;
//! the text between markers becomes one [`Message`].

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::types::Section;
use crate::io::llm::{Message, Role};

const CODE_UNDERSTANDING_TEMPLATE: &str = include_str!("prompts/code_understanding.md");
const BLOG_STRUCTURING_TEMPLATE: &str = include_str!("prompts/blog_structuring.md");
const SECTION_DRAFTING_TEMPLATE: &str = include_str!("prompts/section_drafting.md");

/// Inputs for the section drafting prompt.
#[derive(Debug, Clone, Copy)]
pub struct DraftPromptInput<'a> {
    pub section: &'a Section,
    pub code_summary: &'a str,
    pub previous_draft: Option<&'a str>,
    pub feedback: Option<&'a str>,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
    code_budget_bytes: usize,
}

impl PromptEngine {
    pub fn new(code_budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in [
            ("code_understanding", CODE_UNDERSTANDING_TEMPLATE),
            ("blog_structuring", BLOG_STRUCTURING_TEMPLATE),
            ("section_drafting", SECTION_DRAFTING_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self {
            env,
            code_budget_bytes,
        }
    }

    pub fn code_understanding(&self, code: &str) -> Result<Vec<Message>> {
        let code = truncate_code(code, self.code_budget_bytes);
        self.render("code_understanding", context! { code })
    }

    /// The previous outline and feedback are included only when both exist.
    pub fn blog_structuring(
        &self,
        code_summary: &str,
        previous_sections: &[Section],
        feedback: Option<&str>,
    ) -> Result<Vec<Message>> {
        let feedback = non_blank(feedback);
        let revising = !previous_sections.is_empty() && feedback.is_some();
        self.render(
            "blog_structuring",
            context! {
                code_summary => code_summary.trim(),
                previous_sections => revising.then_some(previous_sections),
                feedback => revising.then_some(feedback).flatten(),
            },
        )
    }

    pub fn section_drafting(&self, input: DraftPromptInput<'_>) -> Result<Vec<Message>> {
        self.render(
            "section_drafting",
            context! {
                section => input.section,
                code_summary => input.code_summary.trim(),
                previous_draft => non_blank(input.previous_draft),
                feedback => non_blank(input.feedback),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<Vec<Message>> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        let messages = split_messages(&rendered)?;
        debug!(
            template = name,
            messages = messages.len(),
            bytes = rendered.len(),
            "rendered prompt"
        );
        Ok(messages)
    }
}

/// Presence check only; the text itself is passed through untouched.
fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|s| !s.trim().is_empty())
}

/// Split rendered template output on role markers.
fn split_messages(rendered: &str) -> Result<Vec<Message>> {
    static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*role:(system|user|assistant)\s*-->").expect("role regex should be valid")
    });

    let markers: Vec<_> = ROLE_RE.captures_iter(rendered).collect();
    let mut messages = Vec::with_capacity(markers.len());
    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(role)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let role = match role.as_str() {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        };
        let content = rendered[whole.end()..end].trim().to_string();
        messages.push(Message { role, content });
    }
    if messages.is_empty() {
        return Err(anyhow!("prompt template has no role markers"));
    }
    Ok(messages)
}

/// Cut `code` to at most `budget` bytes on a char boundary, noting the cut.
pub fn truncate_code(code: &str, budget: usize) -> String {
    if code.len() <= budget {
        return code.to_string();
    }
    let mut cut = budget;
    while !code.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}\n[truncated {} bytes]",
        &code[..cut],
        code.len() - cut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_sections;

    fn engine() -> PromptEngine {
        PromptEngine::new(200_000)
    }

    #[test]
    fn code_understanding_yields_system_and_user_messages() {
        let messages = engine().code_understanding("def f():\n    pass\n").expect("render");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("code reviewer"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("def f():"));
        assert!(!messages[1].content.contains("<!--"));
    }

    #[test]
    fn outline_omits_revision_block_without_feedback() {
        let state = state_with_sections(2);
        let messages = engine()
            .blog_structuring("summary", &state.sections, None)
            .expect("render");
        assert!(!messages[1].content.contains("Previous Outline"));

        let messages = engine()
            .blog_structuring("summary", &[], Some("more detail"))
            .expect("render");
        assert!(!messages[1].content.contains("more detail"));
    }

    #[test]
    fn outline_includes_previous_sections_and_feedback() {
        let state = state_with_sections(2);
        let messages = engine()
            .blog_structuring("summary", &state.sections, Some("more detail on errors"))
            .expect("render");
        let user = &messages[1].content;
        assert!(user.contains("Previous Outline:\n1. Section 1: Section 1 description\n2. Section 2"));
        assert!(user.contains("Human Feedback on Previous Outline:\nmore detail on errors"));
        assert!(user.contains("revised outline"));
        assert!(!user.contains("\n\n\n"));
    }

    #[test]
    fn section_prompt_layers_draft_and_feedback() {
        let state = state_with_sections(1);
        let section = &state.sections[0];
        let first = engine()
            .section_drafting(DraftPromptInput {
                section,
                code_summary: "summary",
                previous_draft: None,
                feedback: None,
            })
            .expect("render");
        assert!(first[1].content.contains("\"Section 1\""));
        assert!(!first[1].content.contains("Previous Draft"));
        assert!(!first[1].content.contains("Human Feedback"));

        let revised = engine()
            .section_drafting(DraftPromptInput {
                section,
                code_summary: "summary",
                previous_draft: Some("old text"),
                feedback: Some("shorter please"),
            })
            .expect("render");
        let user = &revised[1].content;
        let draft_at = user.find("Previous Draft:\nold text").expect("draft");
        let feedback_at = user.find("Human Feedback:\nshorter please").expect("feedback");
        assert!(draft_at < feedback_at);
        assert!(user.contains("revised plain-text draft"));
    }

    #[test]
    fn feedback_reaches_the_prompt_verbatim() {
        let state = state_with_sections(2);
        let feedback = "  point one\n\n\n\npoint two   ";

        let section = engine()
            .section_drafting(DraftPromptInput {
                section: &state.sections[0],
                code_summary: "summary",
                previous_draft: Some("first line\n\n\nlast line"),
                feedback: Some(feedback),
            })
            .expect("render");
        let user = &section[1].content;
        assert!(user.contains("Previous Draft:\nfirst line\n\n\nlast line\n\nHuman Feedback:"));
        assert!(user.contains("Human Feedback:\n  point one\n\n\n\npoint two   \n\nWrite"));

        let outline = engine()
            .blog_structuring("summary", &state.sections, Some(feedback))
            .expect("render");
        assert!(outline[1].content.contains(
            "Human Feedback on Previous Outline:\n  point one\n\n\n\npoint two   \n\nPlease"
        ));
    }

    #[test]
    fn blank_feedback_counts_as_absent() {
        let state = state_with_sections(1);
        let messages = engine()
            .section_drafting(DraftPromptInput {
                section: &state.sections[0],
                code_summary: "summary",
                previous_draft: None,
                feedback: Some(" \n\t"),
            })
            .expect("render");
        assert!(!messages[1].content.contains("Human Feedback"));
        assert!(messages[1].content.contains("summary\n\nWrite a detailed"));
    }

    #[test]
    fn source_code_blank_lines_survive() {
        let code = "def f():\n    pass\n\n\n\ndef g():  \n    pass";
        let messages = engine().code_understanding(code).expect("render");
        assert!(messages[1].content.contains(code));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_code("short", 10), "short");
        let truncated = truncate_code("héllo", 2);
        assert_eq!(truncated, "h\n[truncated 5 bytes]");
    }

    #[test]
    fn oversized_code_is_truncated_in_prompt() {
        let code = "x".repeat(50);
        let messages = PromptEngine::new(10).code_understanding(&code).expect("render");
        assert!(messages[1].content.contains("[truncated 40 bytes]"));
    }
}
