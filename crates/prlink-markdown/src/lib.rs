//! Markdown helpers for the prlink pipeline.
//! Locates image references in pull-request descriptions, rewrites their
//! destinations, and converts descriptions into Jira wiki markup.

pub mod image_refs;
pub mod jira_markup;

pub use image_refs::*;
pub use jira_markup::markdown_to_jira;

use pulldown_cmark::Options;

pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}
