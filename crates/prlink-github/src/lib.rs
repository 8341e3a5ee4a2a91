//! GitHub Actions glue for prlink: event payload loading, source-text
//! collection for key extraction, and the PR body link-back section.

pub mod event_context;
pub mod pr_links;
pub mod source_texts;

pub use event_context::*;
pub use pr_links::*;
pub use source_texts::*;
