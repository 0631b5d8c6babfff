//! Relative links to files inside the docs tree.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::config::Config;
use crate::error::Error;
use crate::issues::IssueKind;

/// Where a local link landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTarget {
    /// Problems with how the link is written. The file may still resolve.
    pub issues: Vec<IssueKind>,
    /// Resolved path relative to the root, `None` if nothing exists there.
    pub path: Option<PathBuf>,
}

/// Maps link roots to files under one of the two addressing conventions.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    /// Tolerate `.html` in extension mode.
    allow_html: bool,
    /// Extensionless addressing.
    clean_urls: bool,
    /// What a directory link resolves to.
    index_file: String,
    /// Docs root on disk.
    root: PathBuf,
}

impl LocalResolver {
    /// Take the addressing settings from `config`.
    pub fn from_config(config: &Config) -> Self {
        return Self {
            allow_html: config.allow_html_extension,
            clean_urls: config.clean_urls,
            index_file: config.index_file.clone(),
            root: config.root.clone(),
        };
    }

    /// Resolve `link_root` written in a document living in `doc_dir`
    /// (both relative to the docs root).
    ///
    /// # Errors
    ///
    /// Returns `Error::FileRead` when the candidate path cannot be inspected for
    /// any reason other than not existing.
    pub fn resolve(&self, doc_dir: &Path, link_root: &str) -> Result<LocalTarget, Error> {
        let decoded = percent_decode_str(link_root).decode_utf8_lossy();
        let is_dir_link = decoded.ends_with('/');
        let written = match decoded.strip_prefix('/') {
            Some(from_root) => PathBuf::from(from_root),
            None => doc_dir.join(&*decoded),
        };
        let written = normalize_path(&written);
        let extension = if is_dir_link { None } else { extension_of(&written) };

        let mut issues = Vec::new();
        let candidate = if self.clean_urls {
            self.clean_url_candidate(&written, extension.as_deref(), is_dir_link, &mut issues)
        } else {
            self.extension_candidate(&written, extension.as_deref(), is_dir_link, &mut issues)?
        };

        let path = match std::fs::metadata(self.root.join(&candidate)) {
            Ok(_) => Some(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                issues.push(IssueKind::LinkedFileNotFound { filepath: display_path(&candidate) });
                None
            },
            Err(e) => return Err(Error::read(self.root.join(&candidate), e)),
        };
        return Ok(LocalTarget { issues, path });
    }

    /// Clean URLs: extensions are reported, directories get the index file,
    /// and bare names get `.md`.
    fn clean_url_candidate(
        &self,
        written: &Path,
        extension: Option<&str>,
        is_dir_link: bool,
        issues: &mut Vec<IssueKind>,
    ) -> PathBuf {
        if is_dir_link {
            return written.join(&self.index_file);
        }
        return match extension {
            Some(ext @ ("md" | "html")) => {
                issues.push(IssueKind::DisallowExtension { extension: ext.to_string() });
                written.with_extension("md")
            },
            Some(_) => written.to_path_buf(),
            None => append_extension(written, "md"),
        };
    }

    /// Extension mode: `.html` means `.md`, and extensionless links are either
    /// a file by that exact name or a directory's index file.
    fn extension_candidate(
        &self,
        written: &Path,
        extension: Option<&str>,
        is_dir_link: bool,
        issues: &mut Vec<IssueKind>,
    ) -> Result<PathBuf, Error> {
        if extension == Some("html") {
            if !self.allow_html {
                issues.push(IssueKind::WrongExtension { actual: "html".to_string(), expected: "md".to_string() });
            }
            return Ok(written.with_extension("md"));
        }
        if extension.is_some() {
            return Ok(written.to_path_buf());
        }
        if !is_dir_link && self.is_file(written)? {
            return Ok(written.to_path_buf());
        }
        return Ok(written.join(&self.index_file));
    }

    /// Whether `relative` is an existing regular file.
    fn is_file(&self, relative: &Path) -> Result<bool, Error> {
        let full = self.root.join(relative);
        return match std::fs::metadata(&full) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::read(full, e)),
        };
    }
}

/// Lowercase extension of the last component.
fn extension_of(path: &Path) -> Option<String> {
    return path.extension().and_then(|e| return e.to_str()).map(str::to_ascii_lowercase);
}

/// `name` → `name.ext`, keeping any dots already in the name.
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    return PathBuf::from(os);
}

/// Forward-slash rendering of a relative path.
pub fn display_path(path: &Path) -> String {
    return path
        .components()
        .map(|c| return c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
}

/// Collapse `.` and `..` components in a path without touching the filesystem.
/// Preserves leading `..` when there is nothing left to pop.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                let can_pop = matches!(components.last(), Some(c) if !matches!(c, Component::ParentDir));
                if can_pop {
                    components.pop();
                } else {
                    components.push(component);
                }
            },
            other => components.push(other),
        }
    }
    return components.iter().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "# Title\n").unwrap();
        }
        dir
    }

    fn resolver(root: &Path, clean_urls: bool) -> LocalResolver {
        let mut config = Config::defaults(root);
        config.clean_urls = clean_urls;
        LocalResolver::from_config(&config)
    }

    #[test]
    fn missing_file_reports_path_under_document_dir() {
        let dir = tree(&["guide/intro.md"]);
        let target = resolver(dir.path(), false).resolve(Path::new("guide"), "./missing.md").unwrap();
        assert_eq!(target.path, None);
        assert_eq!(target.issues, vec![IssueKind::LinkedFileNotFound { filepath: "guide/missing.md".into() }]);
    }

    #[test]
    fn extension_mode_rewrites_html_and_flags_it() {
        let dir = tree(&["guide/intro.md"]);
        let target = resolver(dir.path(), false).resolve(Path::new("guide"), "intro.html").unwrap();
        assert_eq!(target.path, Some(PathBuf::from("guide/intro.md")));
        assert_eq!(target.issues, vec![IssueKind::WrongExtension { actual: "html".into(), expected: "md".into() }]);

        let mut config = Config::defaults(dir.path());
        config.allow_html_extension = true;
        let tolerant = LocalResolver::from_config(&config).resolve(Path::new("guide"), "intro.html").unwrap();
        assert!(tolerant.issues.is_empty());
    }

    #[test]
    fn extension_mode_directories_use_the_index_file() {
        let dir = tree(&["guide/README.md", "LICENSE"]);
        let r = resolver(dir.path(), false);
        assert_eq!(r.resolve(Path::new(""), "./guide").unwrap().path, Some(PathBuf::from("guide/README.md")));
        assert_eq!(r.resolve(Path::new(""), "./guide/").unwrap().path, Some(PathBuf::from("guide/README.md")));
        assert_eq!(r.resolve(Path::new("guide"), "../LICENSE").unwrap().path, Some(PathBuf::from("LICENSE")));
    }

    #[test]
    fn clean_urls_append_md_and_disallow_extensions() {
        let dir = tree(&["guide/intro.md", "guide/README.md"]);
        let r = resolver(dir.path(), true);

        let bare = r.resolve(Path::new("guide"), "./intro").unwrap();
        assert_eq!(bare.path, Some(PathBuf::from("guide/intro.md")));
        assert!(bare.issues.is_empty());

        let explicit = r.resolve(Path::new("guide"), "./intro.md").unwrap();
        assert_eq!(explicit.path, Some(PathBuf::from("guide/intro.md")));
        assert_eq!(explicit.issues, vec![IssueKind::DisallowExtension { extension: "md".into() }]);

        let index = r.resolve(Path::new(""), "/guide/").unwrap();
        assert_eq!(index.path, Some(PathBuf::from("guide/README.md")));
    }

    #[test]
    fn percent_encoded_paths_are_decoded() {
        let dir = tree(&["my docs/a b.md"]);
        let target = resolver(dir.path(), false).resolve(Path::new("my docs"), "./a%20b.md").unwrap();
        assert_eq!(target.path, Some(PathBuf::from("my docs/a b.md")));
    }

    #[test]
    fn normalize_keeps_leading_parent_dirs() {
        assert_eq!(normalize_path(Path::new("a/./b/../c.md")), PathBuf::from("a/c.md"));
        assert_eq!(normalize_path(Path::new("../x/../y")), PathBuf::from("../y"));
    }
}
