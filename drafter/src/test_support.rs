//! Test-only helpers: a scripted model backend and deterministic states.

use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{RunState, SectionOutline, number_sections};
use crate::io::llm::{CompletionRequest, TextGenerator};

/// One queued reply of a [`ScriptedGenerator`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Generator that returns queued replies in order and records every request.
///
/// Running out of replies is an error, so tests fail loudly when a step makes
/// more model calls than expected.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("replies lock").len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator has no replies left")),
        }
    }
}

/// JSON outline reply with one section per title.
pub fn outline_reply(titles: &[&str]) -> ScriptedReply {
    let sections: Vec<_> = titles
        .iter()
        .map(|title| serde_json::json!({ "title": title, "description": format!("{title} description") }))
        .collect();
    ScriptedReply::text(serde_json::json!({ "sections": sections }).to_string())
}

/// State with a summary and `n` sections titled `Section <k>`, nothing drafted.
pub fn state_with_sections(n: usize) -> RunState {
    let outline = (1..=n)
        .map(|k| SectionOutline {
            title: format!("Section {k}"),
            description: format!("Section {k} description"),
        })
        .collect();
    RunState {
        code_summary: "A small program.".to_string(),
        sections: number_sections(outline),
        ..RunState::new("print('hello')")
    }
}

/// Temporary directory populated with `(relative path, contents)` files.
pub fn workspace_with_files(files: &[(&str, &str)]) -> Result<TempDir> {
    let temp = tempfile::tempdir().context("create temp workspace")?;
    for (rel, contents) in files {
        let path = temp.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(temp)
}
