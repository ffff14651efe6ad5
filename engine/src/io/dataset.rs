//! Task dataset loading with JSON Schema validation.
//!
//! A dataset is a JSON object keyed by sample index. Entries keep file
//! order, and a top-level `metadata` entry is skipped.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::task::TaskDescriptor;

const DATASET_SCHEMA: &str = include_str!("../../schemas/dataset.schema.json");
const METADATA_KEY: &str = "metadata";

/// Load, validate and normalise a dataset file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_dataset(path: &Path) -> Result<Vec<TaskDescriptor>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let tasks = parse_dataset(value).with_context(|| format!("load dataset {}", path.display()))?;
    debug!(tasks = tasks.len(), "dataset loaded");
    Ok(tasks)
}

/// Validate a parsed dataset value and convert it into descriptors.
pub fn parse_dataset(value: Value) -> Result<Vec<TaskDescriptor>> {
    validate_schema(&value)?;
    let Value::Object(entries) = value else {
        bail!("dataset must be a JSON object keyed by sample index");
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(entries.len());
    for (sample, mut entry) in entries {
        if sample == METADATA_KEY {
            continue;
        }
        normalise_entry(&mut entry);
        let task: TaskDescriptor = serde_json::from_value(entry)
            .with_context(|| format!("deserialize sample {sample}"))?;
        if !seen.insert(task.task_id.clone()) {
            bail!("duplicate task_id {} (sample {sample})", task.task_id);
        }
        tasks.push(task);
    }
    Ok(tasks)
}

/// Smooth over known data inconsistencies before deserializing.
///
/// - boolean `require_time` means "no time"
/// - null `instruction` / `ground_truth` fall back to their defaults
/// - option values shaped `{"value": x}` collapse to the text of `x`
fn normalise_entry(entry: &mut Value) {
    let Some(fields) = entry.as_object_mut() else {
        return;
    };
    if fields.get("require_time").is_some_and(Value::is_boolean) {
        fields.insert("require_time".to_string(), Value::Null);
    }
    for key in ["instruction", "ground_truth"] {
        if fields.get(key).is_some_and(Value::is_null) {
            fields.remove(key);
        }
    }
    if let Some(Value::Object(options)) = fields.get_mut("options") {
        for value in options.values_mut() {
            if let Some(inner) = value.get("value") {
                let text = match inner {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                *value = Value::String(text);
            }
        }
    }
}

/// Validate a dataset against the embedded Draft 2020-12 schema.
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(DATASET_SCHEMA).context("parse dataset schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile dataset schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("dataset schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
