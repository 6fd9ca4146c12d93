//! Collect source files into the single text blob a run summarizes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::types::precondition;

/// Where the code for a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeSource {
    File(PathBuf),
    /// Walked recursively; only files with a configured extension are read.
    Directory(PathBuf),
    /// Explicit list; files are read as given, directories are walked.
    Files(Vec<PathBuf>),
}

impl CodeSource {
    /// Classify command-line paths.
    ///
    /// One path is a file or directory; several paths are an explicit list.
    pub fn resolve(paths: &[PathBuf], extensions: &[String]) -> Result<Self> {
        match paths {
            [] => precondition("no input paths given"),
            [single] if single.is_dir() => Ok(Self::Directory(single.clone())),
            [single] if single.is_file() => {
                if !has_extension(single, extensions) {
                    return precondition(format!(
                        "{} is not a source file (expected extension: {})",
                        single.display(),
                        extensions.join(", ")
                    ));
                }
                Ok(Self::File(single.clone()))
            }
            [single] => precondition(format!(
                "{} is neither a file nor a directory",
                single.display()
            )),
            many => Ok(Self::Files(many.to_vec())),
        }
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want == ext))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn walk(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_extension(entry.path(), extensions))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Concatenate every readable file of `source`.
///
/// Each file becomes `# ===== <path> =====` followed by its contents; blocks
/// are separated by a blank line. Unreadable files are skipped with a
/// warning. Finding nothing at all is a precondition failure.
pub fn load_code(source: &CodeSource, extensions: &[String]) -> Result<String> {
    let paths = match source {
        CodeSource::File(path) => vec![path.clone()],
        CodeSource::Directory(root) => walk(root, extensions),
        CodeSource::Files(paths) => paths
            .iter()
            .flat_map(|path| {
                if path.is_dir() {
                    walk(path, extensions)
                } else {
                    vec![path.clone()]
                }
            })
            .collect(),
    };

    let mut blocks = Vec::with_capacity(paths.len());
    for path in &paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), bytes = contents.len(), "loaded source file");
                blocks.push(format!("# ===== {} =====\n{contents}", path.display()));
            }
            Err(err) => warn!(path = %path.display(), error = %err, "failed to read source file"),
        }
    }

    if blocks.is_empty() {
        return precondition("no readable source files found");
    }
    Ok(blocks.join("\n\n"))
}
