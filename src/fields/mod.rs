//! Field values held by a wizard session
//!
//! Values are stored flat, keyed by dot-addressable paths (`endereco.cep`).
//! Nesting only happens at the edges: [`FieldValues::to_payload`] builds the
//! JSON object handed to the repository and [`FieldValues::from_payload`]
//! reads a fetched record back into paths.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Dot-addressable field path, e.g. `endereco.cep`
pub type FieldPath = String;

/// A file picked by the user (logo, photo).
///
/// Handles only live in memory; drafts drop them and the user is asked again
/// after a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: None,
        }
    }
}

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Not serializable; stripped by [`FieldValues::without_files`]
    #[serde(skip)]
    File(FileHandle),
    /// Multi-select of option keys (e.g. `tipoUsuario = ["musico"]`)
    Selection(Vec<String>),
    /// Repeated sub-records (e.g. band members)
    Records(Vec<FieldValues>),
    /// Fetched data with no field equivalent, carried through unchanged
    Json(Value),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn selection<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::Selection(options.into_iter().map(Into::into).collect())
    }

    /// True when the value carries nothing a user would call "filled in"
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Selection(items) => items.is_empty(),
            FieldValue::Records(records) => records.is_empty(),
            FieldValue::Number(n) => n.is_nan(),
            FieldValue::Json(value) => match value {
                Value::Null => true,
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                _ => false,
            },
            FieldValue::Bool(_) | FieldValue::File(_) => false,
        }
    }

    /// Number of items for multi-valued fields
    pub fn item_count(&self) -> Option<usize> {
        match self {
            FieldValue::Selection(items) => Some(items.len()),
            FieldValue::Records(records) => Some(records.len()),
            FieldValue::Json(Value::Array(items)) => Some(items.len()),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FieldValue::File(_))
    }

    /// Convert a JSON value into a field value.
    ///
    /// Arrays of strings become selections, arrays of objects become records,
    /// any other array is kept as raw JSON. Returns `None` for `null` and for
    /// objects, which only appear nested under a path.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    Some(FieldValue::Selection(
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect(),
                    ))
                } else if items.iter().all(Value::is_object) {
                    Some(FieldValue::Records(
                        items.iter().map(FieldValues::from_payload).collect(),
                    ))
                } else {
                    Some(FieldValue::Json(value.clone()))
                }
            }
            Value::Object(_) => None,
        }
    }

    /// Render the value in the shape the external API expects
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Number(n) => number_to_json(*n),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::File(handle) => {
                let mut map = Map::new();
                map.insert("name".to_string(), Value::String(handle.name.clone()));
                map.insert("sizeBytes".to_string(), Value::from(handle.size_bytes));
                if let Some(ref mime) = handle.mime_type {
                    map.insert("mimeType".to_string(), Value::String(mime.clone()));
                }
                Value::Object(map)
            }
            FieldValue::Selection(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::Records(records) => {
                Value::Array(records.iter().map(FieldValues::to_payload).collect())
            }
            FieldValue::Json(value) => value.clone(),
        }
    }
}

/// Whole numbers go out as JSON integers (`2009`, not `2009.0`)
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::File(handle) => write!(f, "<file {} ({} bytes)>", handle.name, handle.size_bytes),
            FieldValue::Selection(items) => write!(f, "[{}]", items.join(", ")),
            FieldValue::Records(records) => write!(f, "<{} record(s)>", records.len()),
            FieldValue::Json(value) => write!(f, "{}", value),
        }
    }
}

/// All field values of one wizard instance, keyed by path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<FieldPath, FieldValue>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.0.get(path)
    }

    pub fn set(&mut self, path: impl Into<FieldPath>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(path.into(), value)
    }

    /// Builder-style [`FieldValues::set`]
    pub fn with(mut self, path: impl Into<FieldPath>, value: FieldValue) -> Self {
        self.set(path, value);
        self
    }

    pub fn remove(&mut self, path: &str) -> Option<FieldValue> {
        self.0.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldValue)> {
        self.0.iter()
    }

    /// Text value at `path`, if the field holds text
    pub fn text(&self, path: &str) -> Option<&str> {
        match self.get(path) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean flag at `path`; absent or non-boolean fields read as `false`
    pub fn flag(&self, path: &str) -> bool {
        matches!(self.get(path), Some(FieldValue::Bool(true)))
    }

    /// Selected options at `path`; empty when absent
    pub fn selection(&self, path: &str) -> &[String] {
        match self.get(path) {
            Some(FieldValue::Selection(items)) => items,
            _ => &[],
        }
    }

    /// Subset of values whose paths are in `paths`
    pub fn subset<'a, I>(&self, paths: I) -> FieldValues
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = FieldValues::new();
        for path in paths {
            if let Some(value) = self.get(path) {
                out.set(path, value.clone());
            }
        }
        out
    }

    /// Overlay `self` on top of `base`: paths in `self` win, `base` fills gaps
    pub fn merged_over(&self, base: &FieldValues) -> FieldValues {
        let mut merged = base.clone();
        for (path, value) in &self.0 {
            merged.0.insert(path.clone(), value.clone());
        }
        merged
    }

    /// Copy with every file handle removed, including inside records
    pub fn without_files(&self) -> FieldValues {
        let mut out = BTreeMap::new();
        for (path, value) in &self.0 {
            match value {
                FieldValue::File(_) => {}
                FieldValue::Records(records) => {
                    out.insert(
                        path.clone(),
                        FieldValue::Records(records.iter().map(Self::without_files).collect()),
                    );
                }
                other => {
                    out.insert(path.clone(), other.clone());
                }
            }
        }
        FieldValues(out)
    }

    /// Paths holding file handles (top level only)
    pub fn file_paths(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, v)| v.is_file())
            .map(|(p, _)| p.as_str())
            .collect()
    }

    /// Nest dotted paths into the JSON object the external API accepts
    pub fn to_payload(&self) -> Value {
        let mut root = Map::new();
        for (path, value) in &self.0 {
            insert_nested(&mut root, path, value.to_json());
        }
        Value::Object(root)
    }

    /// Flatten a JSON object into dotted paths
    pub fn from_payload(payload: &Value) -> FieldValues {
        let mut out = FieldValues::new();
        if let Value::Object(map) = payload {
            flatten_into(&mut out, "", map);
        }
        out
    }
}

impl FromIterator<(FieldPath, FieldValue)> for FieldValues {
    fn from_iter<T: IntoIterator<Item = (FieldPath, FieldValue)>>(iter: T) -> Self {
        FieldValues(iter.into_iter().collect())
    }
}

fn insert_nested(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        // A leaf stored at a parent path gives way to the nested object
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
}

fn flatten_into(out: &mut FieldValues, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            // An empty object has no leaves to hold it, so it is kept whole
            Value::Object(child) if child.is_empty() => {
                out.set(path, FieldValue::Json(value.clone()));
            }
            Value::Object(child) => flatten_into(out, &path, child),
            other => {
                if let Some(field) = FieldValue::from_json(other) {
                    out.set(path, field);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_nests_dotted_paths() {
        let values = FieldValues::new()
            .with("nome", FieldValue::text("Ana"))
            .with("endereco.cep", FieldValue::text("01310-100"))
            .with("endereco.numero", FieldValue::Number(42.0));

        assert_eq!(
            values.to_payload(),
            json!({
                "nome": "Ana",
                "endereco": { "cep": "01310-100", "numero": 42 }
            })
        );
    }

    #[test]
    fn test_from_payload_flattens_objects() {
        let payload = json!({
            "nome": "Trio Jazz",
            "contato": { "email": "trio@example.com" },
            "generos": ["jazz", "bossa"],
            "integrantes": [{ "nome": "Rui", "instrumento": "baixo" }],
            "site": null
        });

        let values = FieldValues::from_payload(&payload);
        assert_eq!(values.text("nome"), Some("Trio Jazz"));
        assert_eq!(values.text("contato.email"), Some("trio@example.com"));
        assert_eq!(values.selection("generos"), ["jazz", "bossa"]);
        assert_eq!(values.get("integrantes").and_then(FieldValue::item_count), Some(1));
        assert!(!values.contains("site"));
    }

    #[test]
    fn test_unmapped_json_survives_payload_round_trip() {
        let payload = json!({
            "nome": "Trio Jazz",
            "anoFormacao": 2009,
            "cacheMinimo": 1500.5,
            "anosAtivos": [2019, 2020],
            "tags": ["jazz", 3],
            "redes": {}
        });

        let values = FieldValues::from_payload(&payload);
        assert_eq!(values.get("anosAtivos").and_then(FieldValue::item_count), Some(2));
        assert!(values.get("redes").is_some_and(FieldValue::is_blank));

        assert_eq!(values.to_payload(), payload);
    }

    #[test]
    fn test_merged_over_prefers_self() {
        let baseline = FieldValues::new()
            .with("nome", FieldValue::text("Old"))
            .with("cidade", FieldValue::text("Recife"));
        let draft = FieldValues::new().with("nome", FieldValue::text("New"));

        let merged = draft.merged_over(&baseline);
        assert_eq!(merged.text("nome"), Some("New"));
        assert_eq!(merged.text("cidade"), Some("Recife"));
    }

    #[test]
    fn test_without_files_strips_nested_handles() {
        let member = FieldValues::new()
            .with("nome", FieldValue::text("Rui"))
            .with("foto", FieldValue::File(FileHandle::new("rui.png", 10)));
        let values = FieldValues::new()
            .with("logo", FieldValue::File(FileHandle::new("logo.png", 2048)))
            .with("integrantes", FieldValue::Records(vec![member]));

        let stripped = values.without_files();
        assert!(!stripped.contains("logo"));
        match stripped.get("integrantes") {
            Some(FieldValue::Records(records)) => {
                assert!(!records[0].contains("foto"));
                assert_eq!(records[0].text("nome"), Some("Rui"));
            }
            other => panic!("Expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_values() {
        assert!(FieldValue::text("   ").is_blank());
        assert!(FieldValue::Selection(vec![]).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_serialized_values_are_tagged() {
        let values = FieldValues::new().with("tipoUsuario", FieldValue::selection(["musico"]));
        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(
            json,
            json!({ "tipoUsuario": { "kind": "selection", "value": ["musico"] } })
        );
    }
}
