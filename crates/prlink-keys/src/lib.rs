//! Jira issue-key extraction from branch names, titles, commit messages, and bodies.

pub mod key_extractor;
pub mod key_filters;

pub use key_extractor::*;
pub use key_filters::*;
