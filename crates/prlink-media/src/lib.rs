//! Image retrieval for the prlink pipeline.
//! This crate provides the URL safety policy, the size- and type-checked
//! image fetcher, and attachment filename derivation and de-duplication.

pub mod attachment_names;
pub mod image_fetcher;
pub mod url_policy;

pub use attachment_names::*;
pub use image_fetcher::*;
pub use url_policy::*;
