//! The closed set of problems a link can have.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One problem with one link in one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// What is wrong.
    #[serde(flatten)]
    pub kind: IssueKind,
    /// The link exactly as written in the document.
    pub reference: String,
}

/// Issue variants. Adding one forces every renderer, fixer and search-string
/// derivation to handle it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    /// A local link with an `.md`/`.html` extension under clean-URL addressing.
    DisallowExtension {
        /// Extension without the dot.
        extension: String,
    },
    /// A link ending in a bare `#`.
    EmptyAnchor,
    /// The page was fetched but its body is blank.
    EmptyDom,
    /// The host answers crawlers with a protection challenge.
    Inaccessible {
        /// What gave the block away.
        reason: String,
    },
    /// The local file a link points to does not exist.
    LinkedFileNotFound {
        /// Resolved path, relative to the docs root.
        filepath: String,
    },
    /// The link points at the published copy of a file in this tree.
    LocalAltAvailable {
        /// Why a relative link would do.
        reason: String,
    },
    /// The target exists but does not define the anchor.
    MissingAnchor {
        /// Every anchor the target does define.
        all_anchors: BTreeSet<String>,
        /// The anchor that was asked for, decoded.
        anchor: String,
    },
    /// An `#issuecomment-N` anchor for a comment the API doesn't know.
    MissingGithubComment,
    /// Every fetch attempt failed without an HTTP response.
    NoResponse,
    /// The target answered with a non-2xx status.
    NotOkResponse {
        /// HTTP status.
        status: u16,
        /// Reason phrase.
        status_text: String,
    },
    /// The link no longer lands where it says.
    Redirected {
        /// Link root as written.
        from: String,
        /// Where the request ended.
        to: String,
    },
    /// Neither an absolute URL nor a path inside the docs tree.
    UnknownLinkFormat,
    /// A local `.html` link in extension mode.
    WrongExtension {
        /// Extension as written.
        actual: String,
        /// Extension the file really has.
        expected: String,
    },
}

/// Fieldless mirror of [`IssueKind`], used to group the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// See [`IssueKind::DisallowExtension`].
    DisallowExtension,
    /// See [`IssueKind::EmptyAnchor`].
    EmptyAnchor,
    /// See [`IssueKind::EmptyDom`].
    EmptyDom,
    /// See [`IssueKind::Inaccessible`].
    Inaccessible,
    /// See [`IssueKind::LinkedFileNotFound`].
    LinkedFileNotFound,
    /// See [`IssueKind::LocalAltAvailable`].
    LocalAltAvailable,
    /// See [`IssueKind::MissingAnchor`].
    MissingAnchor,
    /// See [`IssueKind::MissingGithubComment`].
    MissingGithubComment,
    /// See [`IssueKind::NoResponse`].
    NoResponse,
    /// See [`IssueKind::NotOkResponse`].
    NotOkResponse,
    /// See [`IssueKind::Redirected`].
    Redirected,
    /// See [`IssueKind::UnknownLinkFormat`].
    UnknownLinkFormat,
    /// See [`IssueKind::WrongExtension`].
    WrongExtension,
}

impl IssueCode {
    /// Snake-case name, as serialized.
    pub const fn as_str(self) -> &'static str {
        return match self {
            Self::DisallowExtension => "disallow_extension",
            Self::EmptyAnchor => "empty_anchor",
            Self::EmptyDom => "empty_dom",
            Self::Inaccessible => "inaccessible",
            Self::LinkedFileNotFound => "linked_file_not_found",
            Self::LocalAltAvailable => "local_alt_available",
            Self::MissingAnchor => "missing_anchor",
            Self::MissingGithubComment => "missing_github_comment",
            Self::NoResponse => "no_response",
            Self::NotOkResponse => "not_ok_response",
            Self::Redirected => "redirected",
            Self::UnknownLinkFormat => "unknown_link_format",
            Self::WrongExtension => "wrong_extension",
        };
    }

    /// One-line explanation shown under the group title.
    pub const fn description(self) -> &'static str {
        return match self {
            Self::DisallowExtension => "Local links are extensionless under clean URLs.",
            Self::EmptyAnchor => "The link ends in `#` with no anchor after it.",
            Self::EmptyDom => "The page loaded but had no content to check anchors against.",
            Self::Inaccessible => "The host blocks automated requests, so the link could not be verified.",
            Self::LinkedFileNotFound => "The linked file does not exist in the docs tree.",
            Self::LocalAltAvailable => "The link points at the published site; link the file relatively instead.",
            Self::MissingAnchor => "The target exists but does not define the anchor.",
            Self::MissingGithubComment => "The linked issue comment does not exist.",
            Self::NoResponse => "No response after all retries.",
            Self::NotOkResponse => "The server answered with an error status.",
            Self::Redirected => "The link redirects somewhere meaningfully different.",
            Self::UnknownLinkFormat => "The link is neither a URL nor a relative path.",
            Self::WrongExtension => "Local links should use the source file's extension.",
        };
    }

    /// Whether the auto-fixer has a rewrite for this kind.
    pub const fn is_fixable(self) -> bool {
        return matches!(
            self,
            Self::DisallowExtension | Self::EmptyAnchor | Self::MissingAnchor | Self::Redirected | Self::WrongExtension
        );
    }

    /// Warnings are reported but never fail the run.
    pub const fn is_warning(self) -> bool {
        return matches!(self, Self::Inaccessible | Self::LocalAltAvailable);
    }

    /// Group heading.
    pub const fn title(self) -> &'static str {
        return match self {
            Self::DisallowExtension => "Disallowed extension",
            Self::EmptyAnchor => "Empty anchor",
            Self::EmptyDom => "Empty page",
            Self::Inaccessible => "Inaccessible",
            Self::LinkedFileNotFound => "Linked file not found",
            Self::LocalAltAvailable => "Local alternative available",
            Self::MissingAnchor => "Missing anchor",
            Self::MissingGithubComment => "Missing GitHub comment",
            Self::NoResponse => "No response",
            Self::NotOkResponse => "Not OK response",
            Self::Redirected => "Redirected",
            Self::UnknownLinkFormat => "Unknown link format",
            Self::WrongExtension => "Wrong extension",
        };
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(self.as_str());
    }
}

impl IssueKind {
    /// The fieldless code of this variant.
    pub const fn code(&self) -> IssueCode {
        return match self {
            Self::DisallowExtension { .. } => IssueCode::DisallowExtension,
            Self::EmptyAnchor => IssueCode::EmptyAnchor,
            Self::EmptyDom => IssueCode::EmptyDom,
            Self::Inaccessible { .. } => IssueCode::Inaccessible,
            Self::LinkedFileNotFound { .. } => IssueCode::LinkedFileNotFound,
            Self::LocalAltAvailable { .. } => IssueCode::LocalAltAvailable,
            Self::MissingAnchor { .. } => IssueCode::MissingAnchor,
            Self::MissingGithubComment => IssueCode::MissingGithubComment,
            Self::NoResponse => IssueCode::NoResponse,
            Self::NotOkResponse { .. } => IssueCode::NotOkResponse,
            Self::Redirected { .. } => IssueCode::Redirected,
            Self::UnknownLinkFormat => IssueCode::UnknownLinkFormat,
            Self::WrongExtension { .. } => IssueCode::WrongExtension,
        };
    }
}

impl Issue {
    /// Attach a kind to the link it was found on.
    pub fn new(reference: impl Into<String>, kind: IssueKind) -> Self {
        return Self { kind, reference: reference.into() };
    }

    /// Shorthand for `self.kind.code()`.
    pub const fn code(&self) -> IssueCode {
        return self.kind.code();
    }

    /// Human-readable one-liner for the report.
    pub fn message(&self) -> String {
        let reference = &self.reference;
        return match &self.kind {
            IssueKind::DisallowExtension { extension } => {
                format!("{reference} should not carry the .{extension} extension")
            },
            IssueKind::EmptyAnchor => format!("{reference} has an empty anchor"),
            IssueKind::EmptyDom => format!("{reference} returned an empty page"),
            IssueKind::Inaccessible { reason } => format!("{reference} could not be checked: {reason}"),
            IssueKind::LinkedFileNotFound { filepath } => format!("{reference} points to missing file {filepath}"),
            IssueKind::LocalAltAvailable { reason } => format!("{reference}: {reason}"),
            IssueKind::MissingAnchor { anchor, .. } => format!("{reference} has no anchor #{anchor}"),
            IssueKind::MissingGithubComment => format!("{reference} points to a comment that does not exist"),
            IssueKind::NoResponse => format!("{reference} did not respond"),
            IssueKind::NotOkResponse { status, status_text } => {
                format!("{reference} answered {status} {status_text}")
            },
            IssueKind::Redirected { from, to } => format!("{from} redirects to {to}"),
            IssueKind::UnknownLinkFormat => format!("{reference} is not a recognizable link"),
            IssueKind::WrongExtension { actual, expected } => {
                format!("{reference} uses .{actual} where the file is .{expected}")
            },
        };
    }

    /// Apply a fixer rewrite to every string this issue carries.
    pub fn replace_text(&mut self, old: &str, new: &str) {
        let swap = |field: &mut String| {
            if field.contains(old) {
                *field = field.replace(old, new);
            }
        };
        swap(&mut self.reference);
        match &mut self.kind {
            IssueKind::Redirected { from, to } => {
                swap(from);
                swap(to);
            },
            IssueKind::LinkedFileNotFound { filepath } => swap(filepath),
            IssueKind::DisallowExtension { .. }
            | IssueKind::EmptyAnchor
            | IssueKind::EmptyDom
            | IssueKind::Inaccessible { .. }
            | IssueKind::LocalAltAvailable { .. }
            | IssueKind::MissingAnchor { .. }
            | IssueKind::MissingGithubComment
            | IssueKind::NoResponse
            | IssueKind::NotOkResponse { .. }
            | IssueKind::UnknownLinkFormat
            | IssueKind::WrongExtension { .. } => {},
        }
    }

    /// Literal text that locates this issue in its source files.
    pub fn search_string(&self) -> &str {
        return match &self.kind {
            IssueKind::Redirected { from, .. } => from,
            IssueKind::DisallowExtension { .. }
            | IssueKind::EmptyAnchor
            | IssueKind::EmptyDom
            | IssueKind::Inaccessible { .. }
            | IssueKind::LinkedFileNotFound { .. }
            | IssueKind::LocalAltAvailable { .. }
            | IssueKind::MissingAnchor { .. }
            | IssueKind::MissingGithubComment
            | IssueKind::NoResponse
            | IssueKind::NotOkResponse { .. }
            | IssueKind::UnknownLinkFormat
            | IssueKind::WrongExtension { .. } => &self.reference,
        };
    }
}
