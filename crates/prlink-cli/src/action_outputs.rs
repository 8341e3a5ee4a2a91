use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionOutputs {
    /// JSON array of every key found.
    pub(crate) keys: String,
    pub(crate) key: String,
    pub(crate) found: bool,
}

impl ActionOutputs {
    pub(crate) fn from_keys(keys: &[String]) -> Result<Self> {
        Ok(Self {
            keys: serde_json::to_string(keys).context("failed to encode keys output")?,
            key: keys.first().cloned().unwrap_or_default(),
            found: !keys.is_empty(),
        })
    }

    pub(crate) fn render_lines(&self) -> String {
        format!("keys={}\nkey={}\nfound={}\n", self.keys, self.key, self.found)
    }
}

/// Appends `name=value` lines to the runner output file, or prints them when
/// no output file is configured.
pub(crate) fn write_action_outputs(path: Option<&Path>, outputs: &ActionOutputs) -> Result<()> {
    let rendered = outputs.render_lines();
    match path {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open output file {}", path.display()))?;
            file.write_all(rendered.as_bytes())
                .with_context(|| format!("failed to write output file {}", path.display()))?;
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
