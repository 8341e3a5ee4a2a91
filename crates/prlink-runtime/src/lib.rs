//! Reconciliation runtime that syncs one pull request onto a batch of Jira issues.

pub mod issue_report;
pub mod reconcile;

pub use issue_report::*;
pub use reconcile::*;
