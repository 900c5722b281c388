//! Dot-path resolution over resource values
//!
//! Paths are dot separated member names, each optionally followed by one or
//! more `[index]` suffixes: `metadata.labels.owner`, `controls[0].evidence[2]`.
//! The empty path addresses the root.
//!
//! Reads never fail for absent data: a missing member, a null intermediate or
//! an out-of-range index resolves to `None`. Only a malformed path string is an
//! error. Parsed paths are cached by their literal text since the same handful
//! of paths is evaluated against every resource.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use grcgate_core::{Error, Result, Value};
use parking_lot::RwLock;
use tracing::debug;

/// Default number of distinct paths kept in the compiled-path cache
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// One step of a compiled path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Member of an object or key of a map
    Key(String),
    /// Position in a list
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    raw: String,
    segments: Vec<Segment>,
}

impl CompiledPath {
    /// Parse a path string
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = Vec::new();

        if !path.is_empty() {
            for part in path.split('.') {
                parse_part(path, part, &mut segments)?;
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

fn parse_part(path: &str, part: &str, segments: &mut Vec<Segment>) -> Result<()> {
    let (name, mut rest) = match part.find(['[', ']']) {
        Some(pos) => part.split_at(pos),
        None => (part, ""),
    };

    if name.is_empty() && rest.is_empty() {
        return Err(Error::invalid_path(path, "empty segment"));
    }
    if !name.is_empty() {
        segments.push(Segment::Key(name.to_string()));
    }

    while !rest.is_empty() {
        let Some(body) = rest.strip_prefix('[') else {
            return Err(Error::invalid_path(
                path,
                format!("unexpected '{}' in segment '{}'", rest, part),
            ));
        };
        let Some(close) = body.find(']') else {
            return Err(Error::invalid_path(path, format!("unbalanced '[' in segment '{}'", part)));
        };
        let digits = &body[..close];
        if digits.contains('[') {
            return Err(Error::invalid_path(path, format!("unbalanced '[' in segment '{}'", part)));
        }
        let index = digits.parse::<usize>().map_err(|_| {
            Error::invalid_path(path, format!("index '{}' is not a non-negative integer", digits))
        })?;
        segments.push(Segment::Index(index));
        rest = &body[close + 1..];
    }

    Ok(())
}

/// Reads and writes values by path, with a shared compiled-path cache
pub struct PathResolver {
    cache: RwLock<HashMap<String, Arc<CompiledPath>>>,
    capacity: usize,
}

impl PathResolver {
    /// Create a resolver with the default cache capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a resolver that caches up to `capacity` distinct paths
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Parse a path, reusing the cached result when the same text was seen before
    pub fn compile(&self, path: &str) -> Result<Arc<CompiledPath>> {
        if let Some(compiled) = self.cache.read().get(path) {
            return Ok(Arc::clone(compiled));
        }

        let compiled = Arc::new(CompiledPath::parse(path)?);

        let mut cache = self.cache.write();
        if cache.len() >= self.capacity {
            debug!(capacity = self.capacity, "path cache full, clearing");
            cache.clear();
        }
        cache.insert(path.to_string(), Arc::clone(&compiled));

        Ok(compiled)
    }

    /// Number of distinct paths currently cached
    pub fn cached_paths(&self) -> usize {
        self.cache.read().len()
    }

    /// Resolve a path for reading. `Ok(None)` means the path is absent.
    pub fn resolve<'a>(&self, root: &'a Value, path: &str) -> Result<Option<&'a Value>> {
        let compiled = self.compile(path)?;
        Ok(walk(root, compiled.segments()))
    }

    /// Whether the path reaches its leaf. An explicit null leaf exists.
    pub fn exists(&self, root: &Value, path: &str) -> Result<bool> {
        Ok(self.resolve(root, path)?.is_some())
    }

    /// Resolve a path for in-place modification, without creating anything
    pub fn resolve_mut<'a>(&self, root: &'a mut Value, path: &str) -> Result<Option<&'a mut Value>> {
        let compiled = self.compile(path)?;
        Ok(walk_mut(root, compiled.segments()))
    }

    /// Assign `value` at `path`.
    ///
    /// Missing map keys and null members along the way are materialised as
    /// empty maps (or lists, when the next segment is an index). Unknown
    /// members of an object, indices past the end of a list and traversal into
    /// scalars are errors. A failed assignment leaves `root` untouched.
    pub fn set(&self, root: &mut Value, path: &str, value: Value) -> Result<()> {
        let compiled = self.compile(path)?;
        let Some((last, parents)) = compiled.segments().split_last() else {
            *root = value;
            return Ok(());
        };
        check_assignable(root, &compiled)?;

        let mut node = root;
        for segment in parents {
            node = step_or_create(node, segment, &compiled)?;
        }

        materialize(node, last);
        match (node, last) {
            (Value::Object(record), Segment::Key(name)) => {
                let type_name = record.type_name().to_string();
                let slot = record.field_mut(name).ok_or_else(|| {
                    Error::path(compiled.as_str(), format!("{} has no member '{}'", type_name, name))
                })?;
                *slot = value;
            }
            (Value::Map(map), Segment::Key(key)) => {
                map.insert(key.clone(), value);
            }
            (Value::List(items), Segment::Index(idx)) => {
                let idx = *idx;
                if idx < items.len() {
                    items[idx] = value;
                } else if idx == items.len() {
                    items.push(value);
                } else {
                    return Err(Error::path(
                        compiled.as_str(),
                        format!("index {} out of range for list of length {}", idx, items.len()),
                    ));
                }
            }
            (other, segment) => {
                return Err(Error::path(
                    compiled.as_str(),
                    format!("cannot assign '{}' on a {}", segment, other.kind()),
                ));
            }
        }

        Ok(())
    }

    /// Remove the value at `path`.
    ///
    /// Object members are reset to null, map keys and list elements are
    /// deleted. Returns whether anything changed; an absent path is not an
    /// error.
    pub fn remove(&self, root: &mut Value, path: &str) -> Result<bool> {
        let compiled = self.compile(path)?;
        let Some((last, parents)) = compiled.segments().split_last() else {
            let changed = !root.is_null();
            *root = Value::Null;
            return Ok(changed);
        };

        let Some(parent) = walk_mut(root, parents) else {
            return Ok(false);
        };

        let changed = match (parent, last) {
            (Value::Object(record), Segment::Key(name)) => match record.field_mut(name) {
                Some(slot) => {
                    let changed = !slot.is_null();
                    *slot = Value::Null;
                    changed
                }
                None => false,
            },
            (Value::Map(map), Segment::Key(key)) => map.remove(key).is_some(),
            (Value::List(items), Segment::Index(idx)) if *idx < items.len() => {
                items.remove(*idx);
                true
            }
            _ => false,
        };

        Ok(changed)
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn step<'a>(node: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (node, segment) {
        (Value::Object(record), Segment::Key(name)) => record.field(name),
        (Value::Map(map), Segment::Key(key)) => map.get(key),
        (Value::List(items), Segment::Index(idx)) => items.get(*idx),
        _ => None,
    }
}

fn step_mut<'a>(node: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match (node, segment) {
        (Value::Object(record), Segment::Key(name)) => record.field_mut(name),
        (Value::Map(map), Segment::Key(key)) => map.get_mut(key),
        (Value::List(items), Segment::Index(idx)) => items.get_mut(*idx),
        _ => None,
    }
}

fn walk<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, segment| step(node, segment))
}

fn walk_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in segments {
        node = step_mut(node, segment)?;
    }
    Some(node)
}

/// Replace a null node with an empty container suited to `segment`
fn materialize(node: &mut Value, segment: &Segment) {
    if node.is_null() {
        *node = match segment {
            Segment::Key(_) => Value::map(),
            Segment::Index(_) => Value::List(Vec::new()),
        };
    }
}

/// Dry run of [`PathResolver::set`] against the current graph, so that a
/// failing write does not leave freshly created containers behind.
fn check_assignable(root: &Value, compiled: &CompiledPath) -> Result<()> {
    let segments = compiled.segments();
    // `None` once the walk has left the existing graph
    let mut node = Some(root);

    for (pos, segment) in segments.iter().enumerate() {
        let is_last = pos + 1 == segments.len();
        let fail = |message: String| Err(Error::path(compiled.as_str(), message));

        node = match (node.filter(|n| !n.is_null()), segment) {
            (None, Segment::Key(_)) => None,
            (None, Segment::Index(idx)) => {
                if is_last && *idx == 0 {
                    None
                } else {
                    return fail(format!("index {} out of range for list of length 0", idx));
                }
            }
            (Some(Value::Object(record)), Segment::Key(name)) => match record.field(name) {
                Some(member) => Some(member),
                None => return fail(format!("{} has no member '{}'", record.type_name(), name)),
            },
            (Some(Value::Map(map)), Segment::Key(key)) => map.get(key),
            (Some(Value::List(items)), Segment::Index(idx)) => match items.get(*idx) {
                Some(item) => Some(item),
                None if is_last && *idx == items.len() => None,
                None => {
                    return fail(format!(
                        "index {} out of range for list of length {}",
                        idx,
                        items.len()
                    ))
                }
            },
            (Some(other), segment) => {
                let verb = if is_last { "assign" } else { "traverse" };
                return fail(format!("cannot {} '{}' on a {}", verb, segment, other.kind()));
            }
        };
    }

    Ok(())
}

fn step_or_create<'a>(
    node: &'a mut Value,
    segment: &Segment,
    compiled: &CompiledPath,
) -> Result<&'a mut Value> {
    materialize(node, segment);
    match (node, segment) {
        (Value::Object(record), Segment::Key(name)) => {
            let type_name = record.type_name().to_string();
            record.field_mut(name).ok_or_else(|| {
                Error::path(compiled.as_str(), format!("{} has no member '{}'", type_name, name))
            })
        }
        (Value::Map(map), Segment::Key(key)) => Ok(map.entry(key.clone()).or_insert(Value::Null)),
        (Value::List(items), Segment::Index(idx)) => {
            let len = items.len();
            items.get_mut(*idx).ok_or_else(|| {
                Error::path(
                    compiled.as_str(),
                    format!("index {} out of range for list of length {}", idx, len),
                )
            })
        }
        (other, segment) => Err(Error::path(
            compiled.as_str(),
            format!("cannot traverse '{}' on a {}", segment, other.kind()),
        )),
    }
}
