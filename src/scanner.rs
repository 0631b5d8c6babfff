use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::Error;
use crate::local::display_path;

/// A Markdown document found under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Forward-slash path relative to the root; the document's identity.
    pub id: String,
    /// Path on disk.
    pub path: PathBuf,
}

/// Every `.md` file under `config.root` in traversal order, skipping ignored
/// directory names and, unless included, the reference subtree.
///
/// # Errors
///
/// Returns `Error::Io` if a directory cannot be walked.
pub fn scan(config: &Config) -> Result<Vec<Document>, Error> {
    let root = config.root.as_path();
    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| return !is_skipped_dir(entry, root, config));
    for entry in walker {
        let entry = entry.map_err(|e| {
            return Error::Io(e.into_io_error().unwrap_or_else(|| return std::io::Error::other("filesystem loop")));
        })?;
        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| return ext != "md") {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        documents.push(Document { id: display_path(relative), path: entry.path().to_path_buf() });
    }

    return Ok(documents);
}

/// Directories never descended into.
fn is_skipped_dir(entry: &DirEntry, root: &Path, config: &Config) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if config.ignore.iter().any(|ignored| return *ignored == name) {
        return true;
    }
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    return !config.include_reference && config.is_reference_path(relative);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, file: &str) {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "# x\n").unwrap();
    }

    #[test]
    fn walks_markdown_skipping_ignored_and_reference_dirs() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["README.md", "guide/intro.md", "guide/notes.txt", "node_modules/pkg/README.md", "reference/api.md"] {
            write(dir.path(), file);
        }
        let config = Config::defaults(dir.path());
        let ids: Vec<String> = scan(&config).unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["README.md".to_string(), "guide/intro.md".to_string()]);

        let mut with_reference = Config::defaults(dir.path());
        with_reference.include_reference = true;
        let ids: Vec<String> = scan(&with_reference).unwrap().into_iter().map(|d| d.id).collect();
        assert!(ids.contains(&"reference/api.md".to_string()));
    }
}
