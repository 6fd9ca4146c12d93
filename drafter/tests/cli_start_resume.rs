//! CLI tests for the persisted `start` / `resume` / `export` flow.
//!
//! The model backend is a shell one-liner that answers by prompt kind, so the
//! binary runs end to end without network access.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use drafter::exit_codes;
use drafter::test_support::workspace_with_files;

const FAKE_MODEL: &str = r####"input=$(cat)
case "$input" in
  *"### format"*) printf '%s' '{"sections":[{"title":"Overview","description":"What it does."},{"title":"Internals","description":"How it works."}]}' ;;
  *"blog section titled"*) echo "A plain prose draft." ;;
  *) echo "The code greets the user." ;;
esac"####;

fn write_config(root: &Path) {
    let script = FAKE_MODEL.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
    let config = format!(
        "[model]\nbackend = \"command\"\ncommand = [\"sh\", \"-c\", \"{script}\"]\ntimeout_secs = 30\n\n[retry]\nbase_delay_ms = 0\n"
    );
    fs::write(root.join("drafter.toml"), config).expect("write config");
}

fn drafter(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drafter"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("spawn drafter")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn start_resume_export_round_trip() {
    let workspace =
        workspace_with_files(&[("src/hello.py", "print('hello')\n")]).expect("workspace");
    let root = workspace.path();
    write_config(root);

    let output = drafter(root, &["start", "src", "--run-id", "demo"]);
    assert_eq!(output.status.code(), Some(exit_codes::AWAITING_FEEDBACK));
    let payload = stdout_json(&output);
    assert_eq!(payload["current_node"], "human_blog_feedback");
    assert_eq!(payload["blog_structuring_version"], 1);
    assert_eq!(payload["sections"][1]["no"], "2");

    let output = drafter(root, &["export", "demo"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));

    let output = drafter(root, &["resume", "demo", "approved"]);
    assert_eq!(output.status.code(), Some(exit_codes::AWAITING_FEEDBACK));
    let payload = stdout_json(&output);
    assert_eq!(payload["current_node"], "human_section_feedback");
    assert_eq!(payload["section_no"], "1");
    assert_eq!(payload["section_draft"], "A plain prose draft.");

    let output = drafter(root, &["resume", "demo", "approved"]);
    assert_eq!(output.status.code(), Some(exit_codes::AWAITING_FEEDBACK));
    assert_eq!(stdout_json(&output)["section_no"], "2");

    let output = drafter(root, &["resume", "demo", "Approved"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let out_path = root.join("post.md");
    let output = drafter(root, &["export", "demo", "--out", "post.md"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let document = fs::read_to_string(out_path).expect("exported document");
    assert_eq!(
        document,
        "## 1. Overview\n\nA plain prose draft.\n\n## 2. Internals\n\nA plain prose draft.\n\n"
    );

    let output = drafter(root, &["show", "demo"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let checkpoint = stdout_json(&output);
    assert_eq!(checkpoint["status"], "completed");
    assert_eq!(checkpoint["state"]["completed_sections"], serde_json::json!(["1", "2"]));
    assert!(root.join(".drafter/runs/demo/events.jsonl").is_file());
}

#[test]
fn resume_unknown_run_fails() {
    let workspace = workspace_with_files(&[]).expect("workspace");
    write_config(workspace.path());
    let output = drafter(workspace.path(), &["resume", "nope", "approved"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no run 'nope'"));
}

#[test]
fn start_rejects_non_source_file() {
    let workspace = workspace_with_files(&[("notes.txt", "hello")]).expect("workspace");
    write_config(workspace.path());
    let output = drafter(workspace.path(), &["start", "notes.txt"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("precondition failed"));
}
