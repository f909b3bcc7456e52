use serde::Serialize;
use serde_json::{Map, Value};
use crate::{Error, Result};

/// One match produced by a query: the dot-joined path and a copy of the leaf value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEntry {
    pub key: String,
    pub value: Value,
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Follows a dot path such as `"users.42.coins"`. Each segment names an object
/// member or a decimal index into an array.
pub fn get<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(data.get(first)?, |node, segment| child(node, segment))
}

/// Descends into `node` for `segment`.
///
/// Arrays accept an existing index, or `len` to append. A scalar or `null` node is
/// replaced by an empty object first.
fn descend<'a>(node: &'a mut Value, segment: &str) -> Result<&'a mut Value> {
    if let Value::Array(items) = node {
        let len = items.len();
        let i = segment
            .parse::<usize>()
            .ok()
            .filter(|i| *i <= len)
            .ok_or_else(|| {
                Error::InvalidPath(format!(
                    "segment {:?} is not an index into an array of length {}",
                    segment, len
                ))
            })?;
        if i == len {
            items.push(Value::Null);
        }
        return Ok(&mut items[i]);
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .map(|map| map.entry(segment.to_string()).or_insert(Value::Null))
        .ok_or_else(|| Error::Internal("expected an object node".to_string()))
}

/// Writes `value` at `path`, creating or overwriting intermediate nodes as needed.
///
/// Arrays are never discarded: a segment that is neither an existing index nor
/// the next one fails with [`Error::InvalidPath`] and leaves `data` untouched.
pub fn set(data: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    if parents.is_empty() {
        data.insert(last.to_string(), value);
        return Ok(());
    }

    let mut node = data
        .entry(parents[0].to_string())
        .or_insert(Value::Null);
    for segment in &parents[1..] {
        node = descend(node, segment)?;
    }
    *descend(node, last)? = value;
    Ok(())
}

/// Removes the entry at `path`. Returns the removed value, if there was one.
pub fn remove(data: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some(split) => split,
        None => return data.shift_remove(path),
    };

    let mut segments = parent_path.split('.');
    let first = segments.next()?;
    let mut node = data.get_mut(first)?;
    for segment in segments {
        node = match node {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match node {
        Value::Object(map) => map.shift_remove(last),
        Value::Array(items) => {
            let i = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
            Some(items.remove(i))
        }
        _ => None,
    }
}

/// Depth-first walk over every leaf, in insertion order, collecting the leaves
/// `predicate` accepts. Objects and arrays are nesting points; `null` is skipped.
pub fn collect<F>(data: &Map<String, Value>, predicate: &mut F) -> Vec<QueryEntry>
where
    F: FnMut(&Value) -> bool,
{
    let mut results = Vec::new();
    for (key, value) in data {
        walk(value, key.clone(), predicate, &mut results);
    }
    results
}

fn walk<F>(node: &Value, path: String, predicate: &mut F, results: &mut Vec<QueryEntry>)
where
    F: FnMut(&Value) -> bool,
{
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                walk(value, format!("{}.{}", path, key), predicate, results);
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                walk(value, format!("{}.{}", path, i), predicate, results);
            }
        }
        Value::Null => {}
        leaf => {
            if predicate(leaf) {
                results.push(QueryEntry { key: path, value: leaf.clone() });
            }
        }
    }
}
