//! Link and anchor checker for Markdown documentation trees.
//!
//! A [`session::Session`] walks documents, checks every link against local
//! files or fetched pages, and reconciles requested anchors against the
//! anchors each target defines. The resulting issues are grouped by
//! [`dedupe`], optionally rewritten by [`fixer`], and printed by [`report`].

pub mod cache;
pub mod commands;
pub mod config;
pub mod dedupe;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod fixer;
pub mod github;
pub mod heuristics;
pub mod issues;
pub mod jsdoc;
pub mod link;
pub mod local;
pub mod markdown;
pub mod report;
pub mod scanner;
pub mod session;
