//! Pure patch application.

use crate::error::{value_type_name, StateError, StateResult};
use crate::{Op, Patch, Path, Seg};
use serde_json::{Map, Value};

/// Apply a patch to a document, returning the new document.
///
/// The input document is never modified. Given the same document and patch
/// the result is always the same, which is what makes client-side replay of
/// the patch stream equivalent to the live state.
///
/// ```
/// use strand_state::{apply_patch, Op, Patch, path};
/// use serde_json::json;
///
/// let doc = json!({"messages": []});
/// let patch = Patch::new()
///     .with_op(Op::append(path!("messages"), json!({"content": ""})))
///     .with_op(Op::str_append(path!("messages", 0, "content"), "hi"));
/// let next = apply_patch(&doc, &patch).unwrap();
/// assert_eq!(next["messages"][0]["content"], "hi");
/// assert_eq!(doc["messages"], json!([]));
/// ```
pub fn apply_patch(doc: &Value, patch: &Patch) -> StateResult<Value> {
    let mut result = doc.clone();
    for op in patch.ops() {
        apply_op(&mut result, op)?;
    }
    Ok(result)
}

/// Apply patches in sequence, stopping at the first failure.
pub fn apply_patches<'a>(
    doc: &Value,
    patches: impl IntoIterator<Item = &'a Patch>,
) -> StateResult<Value> {
    patches
        .into_iter()
        .try_fold(doc.clone(), |acc, patch| apply_patch(&acc, patch))
}

fn apply_op(doc: &mut Value, op: &Op) -> StateResult<()> {
    match op {
        Op::Set { path, value } => apply_set(doc, path, value.clone()),
        Op::Delete { path } => {
            // No-op when the path does not exist.
            delete_at(doc, path.segments());
            Ok(())
        }
        Op::Append { path, value } => {
            let target = get_or_create(doc, path, 0, || Value::Array(Vec::new()))?;
            match target {
                Value::Array(arr) => {
                    arr.push(value.clone());
                    Ok(())
                }
                other => Err(StateError::type_mismatch(path.clone(), "array", other)),
            }
        }
        Op::StrAppend { path, delta } => {
            let target = get_or_create(doc, path, 0, || Value::String(String::new()))?;
            match target {
                Value::String(s) => {
                    s.push_str(delta);
                    Ok(())
                }
                other => Err(StateError::type_mismatch(path.clone(), "string", other)),
            }
        }
    }
}

fn apply_set(doc: &mut Value, path: &Path, value: Value) -> StateResult<()> {
    if path.is_root() {
        *doc = value;
        return Ok(());
    }
    set_at(doc, path.segments(), value, path)
}

fn set_at(current: &mut Value, segments: &[Seg], value: Value, full: &Path) -> StateResult<()> {
    match segments {
        [] => {
            *current = value;
            Ok(())
        }
        [Seg::Key(key), rest @ ..] => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let obj = current
                .as_object_mut()
                .ok_or_else(|| StateError::path_not_found(full.clone()))?;
            if rest.is_empty() {
                obj.insert(key.clone(), value);
                Ok(())
            } else {
                let entry = obj.entry(key.clone()).or_insert(Value::Null);
                set_at(entry, rest, value, full)
            }
        }
        [Seg::Index(idx), rest @ ..] => {
            let Some(arr) = current.as_array_mut() else {
                return Err(StateError::type_mismatch(full.clone(), "array", current));
            };
            if *idx >= arr.len() {
                return Err(StateError::index_out_of_bounds(full.clone(), *idx, arr.len()));
            }
            if rest.is_empty() {
                arr[*idx] = value;
                Ok(())
            } else {
                set_at(&mut arr[*idx], rest, value, full)
            }
        }
    }
}

fn delete_at(current: &mut Value, segments: &[Seg]) {
    match segments {
        [] => {}
        [Seg::Key(key)] => {
            if let Some(obj) = current.as_object_mut() {
                obj.remove(key);
            }
        }
        [Seg::Index(idx)] => {
            if let Some(arr) = current.as_array_mut() {
                if *idx < arr.len() {
                    arr.remove(*idx);
                }
            }
        }
        [Seg::Key(key), rest @ ..] => {
            if let Some(child) = current.as_object_mut().and_then(|o| o.get_mut(key)) {
                delete_at(child, rest);
            }
        }
        [Seg::Index(idx), rest @ ..] => {
            if let Some(child) = current.as_array_mut().and_then(|a| a.get_mut(*idx)) {
                delete_at(child, rest);
            }
        }
    }
}

/// Walk to the path, materializing intermediate objects and replacing a null
/// leaf with `default`. Array indices along the way must already exist.
fn get_or_create<'a, F>(
    current: &'a mut Value,
    full: &Path,
    consumed: usize,
    default: F,
) -> StateResult<&'a mut Value>
where
    F: Fn() -> Value,
{
    let segments = &full.segments()[consumed..];
    match segments {
        [] => {
            if current.is_null() {
                *current = default();
            }
            Ok(current)
        }
        [Seg::Key(key), ..] => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let obj = current
                .as_object_mut()
                .ok_or_else(|| StateError::path_not_found(full.clone()))?;
            let entry = obj.entry(key.clone()).or_insert(Value::Null);
            get_or_create(entry, full, consumed + 1, default)
        }
        [Seg::Index(idx), ..] => {
            let error_path: Path = full.segments()[..=consumed].iter().cloned().collect();
            if !current.is_array() {
                return Err(StateError::type_mismatch(error_path, "array", current));
            }
            let arr = current
                .as_array_mut()
                .ok_or_else(|| StateError::path_not_found(full.clone()))?;
            if *idx >= arr.len() {
                return Err(StateError::index_out_of_bounds(error_path, *idx, arr.len()));
            }
            get_or_create(&mut arr[*idx], full, consumed + 1, default)
        }
    }
}

/// Read the value at a path, if present.
pub fn get_at_path<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.segments() {
        match seg {
            Seg::Key(key) => current = current.get(key)?,
            Seg::Index(idx) => current = current.get(idx)?,
        }
    }
    Some(current)
}
