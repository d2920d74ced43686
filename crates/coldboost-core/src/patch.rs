//! Structured patching of JSON documents (RFC 6902 / RFC 6901).
//!
//! Operator-supplied cold-start settings carry a list of patch operations
//! that turn the primary pod spec into the boost pod spec, e.g. to trim
//! resource requests or pin the boost pods to a warm node pool:
//!
//! ```text
//! [{"op": "replace", "path": "/containers/0/resources/requests/cpu", "value": "500m"},
//!  {"op": "add",     "path": "/nodeSelector", "value": {"pool": "warm"}}]
//! ```
//!
//! Operations are applied in order to a copy of the document; on error the
//! input is left untouched. `diff` produces the operations that turn one
//! document into another and backs diff-based deployment updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{PodSpec, PodTemplateSpec};

/// A single RFC 6902 operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// Errors raised while applying a patch. These are operator configuration
/// errors, not controller faults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("invalid JSON pointer: {0:?}")]
    InvalidPointer(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("array index out of bounds: {0}")]
    IndexOutOfBounds(String),

    #[error("test operation failed at {0}")]
    TestFailed(String),

    #[error("cannot move {from} into its own child {path}")]
    MoveIntoChild { from: String, path: String },

    #[error("malformed patch: {0}")]
    Malformed(String),

    #[error("patched template is not a valid pod spec: {0}")]
    InvalidPodSpec(String),
}

impl PatchOperation {
    /// Target path of the operation.
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    /// Check pointer syntax without touching a document.
    pub fn validate(&self) -> Result<(), PatchError> {
        parse_pointer(self.path())?;
        if let Self::Move { from, .. } | Self::Copy { from, .. } = self {
            parse_pointer(from)?;
        }
        Ok(())
    }
}

/// Apply `ops` in order to a copy of `doc`.
pub fn apply_patch(doc: &Value, ops: &[PatchOperation]) -> Result<Value, PatchError> {
    let mut out = doc.clone();
    for op in ops {
        apply_one(&mut out, op)?;
    }
    Ok(out)
}

/// Apply `ops` to the pod spec of `template`.
///
/// The template metadata is kept as is. The result must still be a pod
/// spec with at least one container.
pub fn patch_template(
    template: &PodTemplateSpec,
    ops: &[PatchOperation],
) -> Result<PodTemplateSpec, PatchError> {
    if ops.is_empty() {
        return Ok(template.clone());
    }

    let doc = serde_json::to_value(&template.spec)
        .map_err(|e| PatchError::Malformed(e.to_string()))?;
    let patched = apply_patch(&doc, ops)?;
    let spec: PodSpec = serde_json::from_value(patched)
        .map_err(|e| PatchError::InvalidPodSpec(e.to_string()))?;
    if spec.containers.is_empty() {
        return Err(PatchError::InvalidPodSpec("no containers".to_string()));
    }

    Ok(PodTemplateSpec {
        metadata: template.metadata.clone(),
        spec,
    })
}

/// Operations that turn `from` into `to`.
///
/// Objects are compared key by key; any other differing value (including
/// arrays) is replaced whole.
pub fn diff(from: &Value, to: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at(String::new(), from, to, &mut ops);
    ops
}

fn diff_at(path: String, from: &Value, to: &Value, ops: &mut Vec<PatchOperation>) {
    match (from, to) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, av) in a {
                let child = format!("{path}/{}", escape(key));
                match b.get(key) {
                    Some(bv) => diff_at(child, av, bv, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, bv) in b {
                if !a.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: format!("{path}/{}", escape(key)),
                        value: bv.clone(),
                    });
                }
            }
        }
        _ if from == to => {}
        _ => ops.push(PatchOperation::Replace {
            path,
            value: to.clone(),
        }),
    }
}

fn apply_one(doc: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    match op {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => {
            let tokens = parse_pointer(path)?;
            *pointer_mut(doc, &tokens, path)? = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(&format!("{from}/")) {
                return Err(PatchError::MoveIntoChild {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let tokens = parse_pointer(from)?;
            let value = pointer_mut(doc, &tokens, from)?.clone();
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => {
            let tokens = parse_pointer(path)?;
            let current = pointer_mut(doc, &tokens, path)
                .map_err(|_| PatchError::TestFailed(path.clone()))?;
            if *current == *value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let tokens = parse_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };

    match pointer_mut(doc, parent_tokens, path)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let idx = array_index(last, path)?;
            if idx > items.len() {
                return Err(PatchError::IndexOutOfBounds(path.to_string()));
            }
            items.insert(idx, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, PatchError> {
    let tokens = parse_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::Malformed("cannot remove the document root".to_string()));
    };

    match pointer_mut(doc, parent_tokens, path)? {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let idx = array_index(last, path)?;
            if idx >= items.len() {
                return Err(PatchError::IndexOutOfBounds(path.to_string()));
            }
            Ok(items.remove(idx))
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn pointer_mut<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, PatchError> {
    let mut cur = doc;
    for token in tokens {
        cur = match cur {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?,
            Value::Array(items) => {
                let idx = array_index(token, path)?;
                items
                    .get_mut(idx)
                    .ok_or_else(|| PatchError::IndexOutOfBounds(path.to_string()))?
            }
            _ => return Err(PatchError::PathNotFound(path.to_string())),
        };
    }
    Ok(cur)
}

/// Split an RFC 6901 pointer into unescaped reference tokens.
fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(path.to_string()));
    };

    rest.split('/')
        .map(|token| {
            let mut out = String::with_capacity(token.len());
            let mut chars = token.chars();
            while let Some(c) = chars.next() {
                if c != '~' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('0') => out.push('~'),
                    Some('1') => out.push('/'),
                    _ => return Err(PatchError::InvalidPointer(path.to_string())),
                }
            }
            Ok(out)
        })
        .collect()
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn array_index(token: &str, path: &str) -> Result<usize, PatchError> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !well_formed {
        return Err(PatchError::InvalidPointer(path.to_string()));
    }
    token
        .parse()
        .map_err(|_| PatchError::IndexOutOfBounds(path.to_string()))
}
