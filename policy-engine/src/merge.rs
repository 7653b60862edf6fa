//! Structural merge of policy configurations.
//!
//! Confs merge in precedence order (least specific first) with RFC 7396
//! merge-patch semantics, extended by a [`MergeSchema`] the conf type
//! declares: additive list fields that concatenate instead of replacing, a
//! partition field that splits inputs into independently merged groups, and
//! a group-by-key field whose entries merge per key.

use crate::policy::{Entry, WithPolicyAttributes};
use ahash::AHashMap as HashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to serialize a conf")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize a merged conf")]
    Deserialize(#[source] serde_json::Error),

    #[error("a partition field must be a list of strings")]
    PartitionField,

    #[error("a merge-by-key field must be a list of objects")]
    MergeByKeyField,

    #[error("a merge-by-key entry must carry both its key field and a default field")]
    MergeByKeyEntry,
}

/// How the generic merge treats a conf type's serialized fields. Field names
/// are the serialized (JSON) names.
#[derive(Copy, Clone, Debug)]
pub struct MergeSchema {
    /// A list-of-strings field whose values partition the inputs: each conf
    /// joins one group per value (the empty-string group when the field is
    /// absent or empty) and each group merges independently.
    pub partition_by: Option<&'static str>,
    /// A list-of-objects field whose entries merge per key value.
    pub merge_by_key: Option<MergeByKey>,
    /// List fields that concatenate across confs instead of replacing.
    pub append_fields: &'static [&'static str],
}

/// Descriptor for a group-by-key list field.
#[derive(Copy, Clone, Debug)]
pub struct MergeByKey {
    /// The list field itself. Always additive.
    pub field: &'static str,
    /// The member of each entry that identifies its group.
    pub key: &'static str,
    /// The member of each entry holding the mergeable payload.
    pub default: &'static str,
    /// Schema for merging the grouped payloads.
    pub default_schema: &'static MergeSchema,
}

/// A policy configuration the engine can merge.
pub trait Mergeable: Serialize + DeserializeOwned + Clone {
    const SCHEMA: MergeSchema = MergeSchema::EMPTY;

    /// Adjusts a conf after merging. Confs whose internal ordering encodes
    /// precedence (first-match-wins rule lists) restore it here.
    fn transform_after_merge(&mut self) {}
}

// === impl MergeSchema ===

impl MergeSchema {
    pub const EMPTY: MergeSchema = MergeSchema {
        partition_by: None,
        merge_by_key: None,
        append_fields: &[],
    };

    fn is_additive(&self, name: &str) -> bool {
        self.append_fields.contains(&name)
            || name.starts_with("append")
            || self.merge_by_key.map_or(false, |m| m.field == name)
    }
}

/// Merges `confs`, ordered least- to most-specific, into one conf per
/// partition group. Without a partition field the result has a single
/// element; an empty input stays empty.
pub fn merge_confs<C: Mergeable>(confs: Vec<C>) -> Result<Vec<C>, Error> {
    if confs.is_empty() {
        return Ok(Vec::new());
    }
    let values = confs
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::Serialize)?;
    merge_values(values, &C::SCHEMA)?
        .into_iter()
        .map(|value| {
            let mut conf: C = serde_json::from_value(value).map_err(Error::Deserialize)?;
            conf.transform_after_merge();
            Ok(conf)
        })
        .collect()
}

/// Merges entries' confs straight from their attributed wrappers.
pub fn merge_entries<E>(items: &[WithPolicyAttributes<E>]) -> Result<Vec<E::Conf>, Error>
where
    E: Entry,
    E::Conf: Mergeable,
{
    merge_confs(items.iter().map(|item| item.entry.conf().clone()).collect())
}

/// The value-level merge. Callers that already hold serialized confs (or
/// that merge heterogeneous payloads) use this directly.
pub fn merge_values(values: Vec<Value>, schema: &MergeSchema) -> Result<Vec<Value>, Error> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let groups = match schema.partition_by {
        Some(field) => partition(values, field)?,
        None => vec![values],
    };
    groups
        .into_iter()
        .map(|group| merge_group(group, schema))
        .collect()
}

/// Splits confs into groups by the values of `field`, preserving the order
/// in which group keys first appear. A conf listing several values joins
/// every corresponding group, narrowed to that single value.
fn partition(values: Vec<Value>, field: &str) -> Result<Vec<Vec<Value>>, Error> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for value in values {
        for key in partition_keys(&value, field)? {
            let mut narrowed = value.clone();
            if !key.is_empty() {
                if let Some(obj) = narrowed.as_object_mut() {
                    obj.insert(
                        field.to_string(),
                        Value::Array(vec![Value::String(key.clone())]),
                    );
                }
            }
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(narrowed);
        }
    }
    Ok(order
        .into_iter()
        .map(|key| groups.remove(&key).unwrap_or_default())
        .collect())
}

fn partition_keys(value: &Value, field: &str) -> Result<Vec<String>, Error> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(vec![String::new()]),
        Some(Value::Array(items)) if items.is_empty() => Ok(vec![String::new()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(Error::PartitionField),
            })
            .collect(),
        Some(_) => Err(Error::PartitionField),
    }
}

fn merge_group(group: Vec<Value>, schema: &MergeSchema) -> Result<Value, Error> {
    let mut merged = match group.first() {
        Some(value) => value.clone(),
        None => return Ok(Value::Null),
    };
    for value in &group[1..] {
        json_patch::merge(&mut merged, value);
    }

    // Additive fields now hold only the last conf's items; rebuild them from
    // every group member in order.
    clear_additive(&mut merged, schema);
    for value in &group {
        append_additive(&mut merged, value, schema);
    }

    if let Some(by_key) = &schema.merge_by_key {
        merge_by_key(&mut merged, by_key)?;
    }
    Ok(merged)
}

fn clear_additive(value: &mut Value, schema: &MergeSchema) {
    let obj = match value.as_object_mut() {
        Some(obj) => obj,
        None => return,
    };
    for (name, member) in obj.iter_mut() {
        if schema.is_additive(name) {
            if let Value::Array(items) = member {
                items.clear();
            }
        } else if member.is_object() {
            clear_additive(member, schema);
        }
    }
}

fn append_additive(dst: &mut Value, src: &Value, schema: &MergeSchema) {
    let dst_obj = match dst.as_object_mut() {
        Some(obj) => obj,
        None => return,
    };
    let src_obj = match src.as_object() {
        Some(obj) => obj,
        None => return,
    };
    for (name, src_member) in src_obj {
        if schema.is_additive(name) {
            if let (Some(Value::Array(dst_items)), Value::Array(src_items)) =
                (dst_obj.get_mut(name), src_member)
            {
                dst_items.extend(src_items.iter().cloned());
            }
        } else if src_member.is_object() {
            if let Some(dst_member) = dst_obj.get_mut(name) {
                append_additive(dst_member, src_member, schema);
            }
        }
    }
}

struct Acc {
    /// Set when a later entry with the same key absorbed this one.
    skip: bool,
    key: Value,
    defaults: Vec<Value>,
}

/// Merges the entries of the group-by-key field per key value. A later
/// entry takes the position of the last occurrence of its key and merges the
/// absorbed earlier defaults ahead of its own, so later entries win.
fn merge_by_key(value: &mut Value, by_key: &MergeByKey) -> Result<(), Error> {
    let entries = match value.get(by_key.field) {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err(Error::MergeByKeyField),
    };

    let mut accs: Vec<Acc> = Vec::new();
    for entry in &entries {
        let obj = entry.as_object().ok_or(Error::MergeByKeyField)?;
        let key = obj.get(by_key.key).ok_or(Error::MergeByKeyEntry)?.clone();
        let default = obj
            .get(by_key.default)
            .ok_or(Error::MergeByKeyEntry)?
            .clone();
        let mut defaults = vec![default];
        for acc in accs.iter_mut().filter(|acc| !acc.skip) {
            if acc.key == key {
                let mut absorbed = std::mem::take(&mut acc.defaults);
                absorbed.append(&mut defaults);
                defaults = absorbed;
                acc.skip = true;
            }
        }
        accs.push(Acc {
            skip: false,
            key,
            defaults,
        });
    }

    let mut merged_entries = Vec::new();
    for acc in accs.into_iter().filter(|acc| !acc.skip) {
        for merged in merge_values(acc.defaults, by_key.default_schema)? {
            let mut entry = serde_json::Map::new();
            entry.insert(by_key.key.to_string(), acc.key.clone());
            entry.insert(by_key.default.to_string(), merged);
            merged_entries.push(Value::Object(entry));
        }
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert(by_key.field.to_string(), Value::Array(merged_entries));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Conf {
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        append_tags: Vec<String>,
    }

    impl Mergeable for Conf {}

    fn conf(action: Option<&str>, limit: Option<u32>, tags: &[&str]) -> Conf {
        Conf {
            action: action.map(Into::into),
            limit,
            append_tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn empty_input_merges_to_nothing() {
        assert!(merge_confs::<Conf>(vec![]).unwrap().is_empty());
    }

    #[test]
    fn later_confs_override_earlier_scalars() {
        let merged = merge_confs(vec![
            conf(Some("allow"), Some(10), &[]),
            conf(Some("deny"), None, &[]),
        ])
        .unwrap();
        assert_eq!(merged, vec![conf(Some("deny"), Some(10), &[])]);
    }

    #[test]
    fn merge_is_idempotent_for_non_additive_fields() {
        let single = conf(Some("allow"), Some(10), &["a"]);
        let merged = merge_confs(vec![single.clone()]).unwrap();
        assert_eq!(merged, vec![single]);

        let scalars = conf(Some("allow"), Some(10), &[]);
        let merged = merge_confs(vec![scalars.clone(), scalars.clone()]).unwrap();
        assert_eq!(merged, vec![scalars]);
    }

    #[test]
    fn additive_fields_accumulate_repeated_confs() {
        let single = conf(None, None, &["a"]);
        let merged = merge_confs(vec![single.clone(), single]).unwrap();
        assert_eq!(merged, vec![conf(None, None, &["a", "a"])]);
    }

    #[test]
    fn append_fields_concatenate_in_order() {
        let merged = merge_confs(vec![
            conf(None, None, &["a", "b"]),
            conf(None, None, &["c"]),
            conf(None, None, &[]),
        ])
        .unwrap();
        assert_eq!(merged, vec![conf(None, None, &["a", "b", "c"])]);
    }

    #[test]
    fn nested_append_fields_concatenate() {
        const SCHEMA: MergeSchema = MergeSchema::EMPTY;
        let merged = merge_values(
            vec![
                json!({"outer": {"appendItems": [1, 2]}}),
                json!({"outer": {"appendItems": [3]}}),
            ],
            &SCHEMA,
        )
        .unwrap();
        assert_eq!(merged, vec![json!({"outer": {"appendItems": [1, 2, 3]}})]);
    }

    #[test]
    fn partition_groups_by_field_values_in_first_appearance_order() {
        const SCHEMA: MergeSchema = MergeSchema {
            partition_by: Some("hostnames"),
            merge_by_key: None,
            append_fields: &[],
        };
        let merged = merge_values(
            vec![
                json!({"hostnames": ["a.com", "b.com"], "limit": 1}),
                json!({"limit": 2}),
                json!({"hostnames": ["b.com"], "limit": 3}),
            ],
            &SCHEMA,
        )
        .unwrap();
        assert_eq!(
            merged,
            vec![
                json!({"hostnames": ["a.com"], "limit": 1}),
                json!({"hostnames": ["b.com"], "limit": 3}),
                json!({"limit": 2}),
            ]
        );
    }

    #[test]
    fn partition_field_must_hold_strings() {
        const SCHEMA: MergeSchema = MergeSchema {
            partition_by: Some("hostnames"),
            merge_by_key: None,
            append_fields: &[],
        };
        let err = merge_values(vec![json!({"hostnames": [1]})], &SCHEMA).unwrap_err();
        assert!(matches!(err, Error::PartitionField));
        let err = merge_values(vec![json!({"hostnames": "a.com"})], &SCHEMA).unwrap_err();
        assert!(matches!(err, Error::PartitionField));
    }

    const RULES_SCHEMA: MergeSchema = MergeSchema {
        partition_by: None,
        merge_by_key: Some(MergeByKey {
            field: "rules",
            key: "matches",
            default: "default",
            default_schema: &MergeSchema::EMPTY,
        }),
        append_fields: &[],
    };

    #[test]
    fn merge_by_key_merges_per_key_at_the_later_position() {
        let merged = merge_values(
            vec![
                json!({"rules": [
                    {"matches": {"path": "/a"}, "default": {"filter": "x", "limit": 1}},
                    {"matches": {"path": "/b"}, "default": {"filter": "y"}},
                ]}),
                json!({"rules": [
                    {"matches": {"path": "/a"}, "default": {"filter": "z"}},
                ]}),
            ],
            &RULES_SCHEMA,
        )
        .unwrap();
        assert_eq!(
            merged,
            vec![json!({"rules": [
                {"matches": {"path": "/b"}, "default": {"filter": "y"}},
                {"matches": {"path": "/a"}, "default": {"filter": "z", "limit": 1}},
            ]})]
        );
    }

    #[test]
    fn merge_by_key_requires_entry_key_and_default() {
        let err = merge_values(
            vec![json!({"rules": [{"matches": {"path": "/a"}}]})],
            &RULES_SCHEMA,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MergeByKeyEntry));

        let err = merge_values(vec![json!({"rules": {"not": "a list"}})], &RULES_SCHEMA)
            .unwrap_err();
        assert!(matches!(err, Error::MergeByKeyField));
    }

    #[test]
    fn merge_by_key_field_is_absent_friendly() {
        let merged = merge_values(vec![json!({"limit": 1})], &RULES_SCHEMA).unwrap();
        assert_eq!(merged, vec![json!({"limit": 1})]);
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Reversing {
        items: Vec<u32>,
    }

    impl Mergeable for Reversing {
        fn transform_after_merge(&mut self) {
            self.items.reverse();
        }
    }

    #[test]
    fn transform_hook_runs_after_merging() {
        let merged = merge_confs(vec![Reversing { items: vec![1, 2, 3] }]).unwrap();
        assert_eq!(merged, vec![Reversing { items: vec![3, 2, 1] }]);
    }
}
