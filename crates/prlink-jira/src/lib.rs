//! Jira REST client and comment reconciliation for prlink.
//! Exposes the attachment uploader, the comment writer state machine, and the
//! comment body renderers used when syncing a pull request onto Jira issues.

pub mod change_request;
pub mod comment_writer;
pub mod jira_api_client;
pub mod transport_helpers;

pub use change_request::*;
pub use comment_writer::*;
pub use jira_api_client::*;
