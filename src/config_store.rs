// src/config_store.rs
//
// Writes threshold changes back to the YAML config file so they survive a
// restart. Only `thresholds.absence_seconds` is touched. The value is edited
// in place so comments and layout survive; a file where the key is missing
// or not in block style is rewritten from the parsed document instead.

use crate::pipeline::ConfigStore;
use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct YamlConfigStore {
    path: PathBuf,
}

impl YamlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for YamlConfigStore {
    fn persist_absence_threshold(&self, seconds: f64) -> Result<()> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let mut root: Value = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        let updated = match rewrite_in_place(&text, seconds) {
            Some(updated) if absence_seconds(&updated) == Some(seconds) => updated,
            _ => rewrite_document(&mut root, seconds)?,
        };
        std::fs::write(&self.path, updated)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Replace the value of the `absence_seconds` line directly under the
/// top-level `thresholds:` block, keeping indentation and any trailing
/// comment.
fn rewrite_in_place(text: &str, seconds: f64) -> Option<String> {
    let mut in_thresholds = false;
    let mut child_indent: Option<usize> = None;
    let mut replaced = false;
    let mut lines = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        let is_content = !trimmed.is_empty() && !trimmed.starts_with('#');

        if is_content && indent == 0 {
            let key = trimmed.split('#').next().unwrap_or_default().trim_end();
            in_thresholds = key == "thresholds:";
            child_indent = None;
        } else if in_thresholds && is_content && !replaced {
            let expected = *child_indent.get_or_insert(indent);
            if indent == expected {
                if let Some(rest) = trimmed.strip_prefix("absence_seconds:") {
                    let mut edited = format!("{}absence_seconds: {}", &line[..indent], seconds);
                    if let Some(pos) = rest.find('#') {
                        edited.push_str("    ");
                        edited.push_str(&rest[pos..]);
                    }
                    lines.push(edited);
                    replaced = true;
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    if !replaced {
        return None;
    }
    let mut updated = lines.join("\n");
    if text.ends_with('\n') {
        updated.push('\n');
    }
    Some(updated)
}

fn absence_seconds(text: &str) -> Option<f64> {
    let root: Value = serde_yaml::from_str(text).ok()?;
    root.get("thresholds")?.get("absence_seconds")?.as_f64()
}

fn rewrite_document(root: &mut Value, seconds: f64) -> Result<String> {
    let root_map = root
        .as_mapping_mut()
        .context("Config root is not a mapping")?;
    let thresholds = root_map
        .entry(Value::from("thresholds"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    let thresholds = thresholds
        .as_mapping_mut()
        .context("`thresholds` is not a mapping")?;
    thresholds.insert(Value::from("absence_seconds"), Value::from(seconds));

    serde_yaml::to_string(root).context("Failed to serialise config")
}
