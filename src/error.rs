/// Crate-level error types for doclinks diagnostics.
use std::path::PathBuf;

/// Errors that abort a run. Problems with the documentation itself are never
/// errors: they become [`crate::issues::Issue`] values and end up in the report.
/// Each variant names the file, entry point, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-level error type")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The on-disk issue cache exists but cannot be used.
    #[error("issue cache corrupt: {reason}")]
    CacheCorrupt {
        /// Description of the corruption.
        reason: String,
    },

    /// A document or config file could not be read for a reason other than absence.
    #[error("cannot read {}: {source}", path.display())]
    FileRead {
        /// File that failed to read.
        path: PathBuf,
        /// The wrapped I/O error.
        source: std::io::Error,
    },

    /// The module entry point is neither a readable path nor an http(s) URL.
    #[error("invalid module entry point `{entry}`: {reason}")]
    InvalidEntryPoint {
        /// Entry point as given on the command line.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization of the issue cache failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// A remote module entry point could not be downloaded.
    #[error("cannot fetch module {url}: {reason}")]
    ModuleFetchFailed {
        /// Why the fetch failed.
        reason: String,
        /// Module URL.
        url: String,
    },

    /// Tree-sitter failed to parse a module source file.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// TOML deserialization of `.doclinks.toml` failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No tree-sitter grammar registered for this module extension.
    #[error("no grammar for extension: .{ext}")]
    UnsupportedLanguage {
        /// File extension without the leading dot.
        ext: String,
    },
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        return Self::FileRead { path: path.into(), source };
    }
}
