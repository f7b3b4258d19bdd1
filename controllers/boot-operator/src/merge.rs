//! Deep merge of configuration layers.
//!
//! Values are merged through their JSON representation so the same rules
//! apply to operator config records, Kubernetes containers and pod specs:
//!
//! - a zero `src` value (null, `""`, `0`, `false`, empty list or map) never
//!   touches `dst`
//! - maps merge key by key, recursively
//! - lists under an `env` key are keyed by `name`: a colliding entry is
//!   replaced in place (override mode) or kept (keep-existing mode); new names
//!   are appended in `src` order
//! - every other list is replaced whole (override mode) or kept
//!
//! A failed merge leaves `dst` untouched and reports [`MergeOutcome::Failed`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::error;

/// What happens when `src` and `dst` both carry a non-zero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// `src` wins
    Override,
    /// `dst` wins; only missing or zero values are filled from `src`
    KeepExisting,
}

/// Result of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `dst` was modified
    Merged,
    /// `dst` already held everything `src` carries
    Unchanged,
    /// The layers are incompatible; `dst` was left as it was
    Failed(String),
}

impl MergeOutcome {
    /// Logs a failure at `error!` and passes the outcome through.
    pub fn log_failure(self, what: &str, owner: &str) -> Self {
        if let MergeOutcome::Failed(reason) = &self {
            error!("Config merge error for {} ({}): {}", owner, what, reason);
        }
        self
    }
}

/// Merges `src` into `dst`, `src` winning on collisions.
pub fn merge_override<D, S>(dst: &mut D, src: &S) -> MergeOutcome
where
    D: Serialize + DeserializeOwned,
    S: Serialize + ?Sized,
{
    merge_with(dst, src, MergeMode::Override)
}

/// Merges `src` into `dst`, `dst` winning on collisions.
pub fn merge_keep_existing<D, S>(dst: &mut D, src: &S) -> MergeOutcome
where
    D: Serialize + DeserializeOwned,
    S: Serialize + ?Sized,
{
    merge_with(dst, src, MergeMode::KeepExisting)
}

/// Merges any two serializable records.
pub fn merge_with<D, S>(dst: &mut D, src: &S, mode: MergeMode) -> MergeOutcome
where
    D: Serialize + DeserializeOwned,
    S: Serialize + ?Sized,
{
    let mut merged = match serde_json::to_value(&*dst) {
        Ok(v) => v,
        Err(e) => return MergeOutcome::Failed(format!("encoding destination: {}", e)),
    };
    let src = match serde_json::to_value(src) {
        Ok(v) => v,
        Err(e) => return MergeOutcome::Failed(format!("encoding source: {}", e)),
    };

    match merge_values(&mut merged, &src, mode) {
        Ok(false) => MergeOutcome::Unchanged,
        Ok(true) => match serde_json::from_value(merged) {
            Ok(value) => {
                *dst = value;
                MergeOutcome::Merged
            }
            Err(e) => MergeOutcome::Failed(format!("decoding merged value: {}", e)),
        },
        Err(reason) => MergeOutcome::Failed(reason),
    }
}

/// Keyed merge of two named lists (`[{name, ...}]`), such as env lists.
pub fn merge_named<D, S>(dst: &mut Vec<D>, src: &[S], mode: MergeMode) -> MergeOutcome
where
    D: Serialize + DeserializeOwned,
    S: Serialize,
{
    let mut merged = match serde_json::to_value(&*dst) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return MergeOutcome::Failed("destination is not a list".to_string()),
        Err(e) => return MergeOutcome::Failed(format!("encoding destination: {}", e)),
    };
    let src = match serde_json::to_value(src) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return MergeOutcome::Failed("source is not a list".to_string()),
        Err(e) => return MergeOutcome::Failed(format!("encoding source: {}", e)),
    };

    match merge_named_values(&mut merged, &src, mode, "env") {
        Ok(false) => MergeOutcome::Unchanged,
        Ok(true) => match serde_json::from_value(Value::Array(merged)) {
            Ok(value) => {
                *dst = value;
                MergeOutcome::Merged
            }
            Err(e) => MergeOutcome::Failed(format!("decoding merged list: {}", e)),
        },
        Err(reason) => MergeOutcome::Failed(reason),
    }
}

/// Merges two JSON values in place.
///
/// On error `dst` is left unmodified. Returns whether `dst` changed.
///
/// # Errors
///
/// Fails when `src` and `dst` disagree on the shape of a non-zero value, or
/// when a named-list entry has no `name`.
pub fn merge_values(dst: &mut Value, src: &Value, mode: MergeMode) -> Result<bool, String> {
    let mut work = dst.clone();
    let changed = merge_value(&mut work, src, mode, "")?;
    if changed {
        *dst = work;
    }
    Ok(changed)
}

fn merge_value(dst: &mut Value, src: &Value, mode: MergeMode, path: &str) -> Result<bool, String> {
    if is_zero(src) {
        return Ok(false);
    }
    if is_zero(dst) {
        let changed = dst != src;
        *dst = src.clone();
        return Ok(changed);
    }

    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => merge_objects(d, s, mode, path),
        (Value::Array(d), Value::Array(s)) if is_named_list_field(path) => {
            merge_named_values(d, s, mode, path)
        }
        (dst, src) if same_shape(dst, src) => match mode {
            MergeMode::Override if dst != src => {
                *dst = src.clone();
                Ok(true)
            }
            _ => Ok(false),
        },
        (dst, src) => Err(format!(
            "cannot merge {} into {} at '{}'",
            shape(src),
            shape(dst),
            display_path(path)
        )),
    }
}

fn merge_objects(
    dst: &mut Map<String, Value>,
    src: &Map<String, Value>,
    mode: MergeMode,
    path: &str,
) -> Result<bool, String> {
    let mut changed = false;
    for (key, value) in src {
        if is_zero(value) {
            continue;
        }
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        match dst.get_mut(key) {
            Some(existing) => changed |= merge_value(existing, value, mode, &child)?,
            None => {
                dst.insert(key.clone(), value.clone());
                changed = true;
            }
        }
    }
    Ok(changed)
}

fn merge_named_values(
    dst: &mut Vec<Value>,
    src: &[Value],
    mode: MergeMode,
    path: &str,
) -> Result<bool, String> {
    let mut changed = false;
    for entry in src {
        let name = entry_name(entry)
            .ok_or_else(|| format!("entry without a name at '{}'", display_path(path)))?;
        let existing = dst
            .iter_mut()
            .find(|candidate| entry_name(candidate) == Some(name));
        match existing {
            Some(slot) => {
                if mode == MergeMode::Override && slot != entry {
                    *slot = entry.clone();
                    changed = true;
                }
            }
            None => {
                dst.push(entry.clone());
                changed = true;
            }
        }
    }
    Ok(changed)
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

fn is_named_list_field(path: &str) -> bool {
    path == "env" || path.ends_with(".env")
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn same_shape(a: &Value, b: &Value) -> bool {
    shape(a) == shape(b)
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}
