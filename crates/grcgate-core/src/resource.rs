//! Typed wrapper for GRC entities under policy evaluation
//!
//! Business entities (evidence, risks, controls, ...) are projected onto a
//! common shape before evaluation: identity, title, type and a metadata block
//! carrying labels and annotations. Policies address that shape with paths
//! such as `metadata.labels.dataClassification`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Record, Result, Value};

const RESOURCE_TYPE: &str = "PolicyResource";
const METADATA_TYPE: &str = "ResourceMetadata";

/// A GRC entity prepared for policy evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResource {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub metadata: ResourceMetadata,
}

/// Labels drive most policy conditions; annotations carry free-form notes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl PolicyResource {
    /// Create a resource with a fresh id and no labels
    pub fn new(resource_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            resource_type: resource_type.into(),
            metadata: ResourceMetadata::default(),
        }
    }

    /// Set a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Set an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// Project onto a [`Value::Object`] the policy engine can walk and mutate
    pub fn to_value(&self) -> Value {
        let metadata = Record::new(METADATA_TYPE)
            .with_field("Labels", string_map(&self.metadata.labels))
            .with_field("Annotations", string_map(&self.metadata.annotations));

        Record::new(RESOURCE_TYPE)
            .with_field("Id", self.id.to_string())
            .with_field("Title", self.title.as_str())
            .with_field("Type", self.resource_type.as_str())
            .with_field("Metadata", metadata)
            .into()
    }

    /// Rebuild a resource from a value, typically after mutations were applied.
    ///
    /// Accepts both the record produced by [`PolicyResource::to_value`] and a
    /// plain map (for example parsed JSON). Scalar label values are stored as
    /// their text and null labels are dropped. A list or map under a label is
    /// an error, since the typed form cannot hold it.
    pub fn from_value(value: &Value) -> Result<Self> {
        let id = member(value, "id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::internal("resource is missing a string 'id'"))?;
        let id = Uuid::parse_str(id)
            .map_err(|e| Error::internal(format!("resource id '{}' is not a uuid: {}", id, e)))?;

        let title = member(value, "title").and_then(Value::to_text).unwrap_or_default();
        let resource_type = member(value, "type").and_then(Value::to_text).unwrap_or_default();

        let metadata = match member(value, "metadata") {
            Some(meta) => ResourceMetadata {
                labels: text_map("labels", member(meta, "labels"))?,
                annotations: text_map("annotations", member(meta, "annotations"))?,
            },
            None => ResourceMetadata::default(),
        };

        Ok(Self {
            id,
            title,
            resource_type,
            metadata,
        })
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn member<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(record) => record.field(name),
        Value::Map(map) => map
            .get(name)
            .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v)),
        _ => None,
    }
}

fn text_map(section: &str, value: Option<&Value>) -> Result<BTreeMap<String, String>> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Map(map) => {
            let mut texts = BTreeMap::new();
            for (key, entry) in map {
                if entry.is_null() {
                    continue;
                }
                let text = entry.to_text().ok_or_else(|| {
                    Error::internal(format!(
                        "metadata.{}.{} holds a {}, expected a scalar",
                        section,
                        key,
                        entry.kind()
                    ))
                })?;
                texts.insert(key.clone(), text);
            }
            Ok(texts)
        }
        other => Err(Error::internal(format!(
            "expected a map of {}, found {}",
            section,
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_round_trip() {
        let resource = PolicyResource::new("Evidence", "SOC2 access review")
            .with_label("dataClassification", "internal")
            .with_annotation("source", "upload");

        let back = PolicyResource::from_value(&resource.to_value()).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn test_from_json_map() {
        let id = Uuid::new_v4();
        let value = Value::from(serde_json::json!({
            "id": id.to_string(),
            "title": "Risk register",
            "type": "Risk",
            "metadata": { "labels": { "owner": "grc-team", "approvedForProd": true, "gone": null } }
        }));

        let resource = PolicyResource::from_value(&value).unwrap();
        assert_eq!(resource.id, id);
        assert_eq!(resource.label("owner"), Some("grc-team"));
        assert_eq!(resource.label("approvedForProd"), Some("true"));
        assert_eq!(resource.label("gone"), None);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let value = Value::from(serde_json::json!({ "title": "orphan" }));
        assert!(PolicyResource::from_value(&value).is_err());
    }

    #[test]
    fn test_container_label_is_rejected() {
        let mut value = PolicyResource::new("Evidence", "SOC2 access review")
            .with_label("dataClassification", "internal")
            .to_value();

        let Value::Object(record) = &mut value else {
            panic!("expected a record");
        };
        let Some(Value::Object(metadata)) = record.field_mut("metadata") else {
            panic!("expected metadata record");
        };
        let Some(Value::Map(labels)) = metadata.field_mut("labels") else {
            panic!("expected a label map");
        };
        labels.insert(
            "reviewers".into(),
            Value::List(vec![Value::from("alice"), Value::from("bob")]),
        );

        let err = PolicyResource::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("metadata.labels.reviewers"));
    }
}
