//! Shared fixtures for the engine's tests.

use crate::merge::Mergeable;
use crate::policy::{Policy, PolicyWithRules, PolicyWithToList, RuleEntry, ToEntry};
use policy_engine_core::{
    labels, Port, Resource, ResourceIdentifier, ResourceKind, ResourceMeta, ResourceReader,
    TargetRef,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct TestResource {
    pub meta: ResourceMeta,
    pub kind: ResourceKind,
    pub ports: Vec<Port>,
}

// === impl TestResource ===

impl TestResource {
    pub fn new(kind: ResourceKind, mesh: &str, name: &str) -> Self {
        Self {
            meta: ResourceMeta::new(name, mesh, BTreeMap::new()),
            kind,
            ports: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.meta.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn in_namespace(self, namespace: &str) -> Self {
        let display = self.meta.name.clone();
        self.with_label(labels::K8S_NAMESPACE, namespace)
            .with_label(labels::DISPLAY_NAME, &display)
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }
}

impl Resource for TestResource {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }
}

#[derive(Default)]
pub struct TestReader {
    resources: Vec<Arc<dyn Resource>>,
}

// === impl TestReader ===

impl TestReader {
    pub fn with(mut self, resource: TestResource) -> Self {
        self.resources.push(Arc::new(resource));
        self
    }
}

impl ResourceReader for TestReader {
    fn get(&self, kind: ResourceKind, id: &ResourceIdentifier) -> Option<Arc<dyn Resource>> {
        self.resources
            .iter()
            .find(|r| r.kind() == kind && ResourceIdentifier::of(r.as_ref()) == *id)
            .cloned()
    }

    fn list_or_empty(&self, kind: ResourceKind) -> Vec<Arc<dyn Resource>> {
        self.resources
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }
}

/// A conf exercising scalar override and list append during merges.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestConf {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub append_entries: Vec<String>,
}

impl Mergeable for TestConf {}

// === impl TestConf ===

impl TestConf {
    pub fn action(action: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            ..Self::default()
        }
    }

    pub fn entries(entries: &[&str]) -> Self {
        Self {
            append_entries: entries.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }
}

pub struct TestPolicy<C> {
    pub meta: Arc<ResourceMeta>,
    pub target_ref: TargetRef,
    pub rules: Vec<RuleEntry<C>>,
    pub to_list: Vec<ToEntry<C>>,
}

// === impl TestPolicy ===

impl<C> TestPolicy<C> {
    pub fn new(mesh: &str, name: &str, target_ref: TargetRef) -> Self {
        Self::with_labels(mesh, name, target_ref, BTreeMap::new())
    }

    pub fn with_labels(
        mesh: &str,
        name: &str,
        target_ref: TargetRef,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            meta: Arc::new(ResourceMeta::new(name, mesh, labels)),
            target_ref,
            rules: Vec::new(),
            to_list: Vec::new(),
        }
    }

    pub fn with_rule(mut self, default: C) -> Self {
        self.rules.push(RuleEntry::new(default));
        self
    }

    pub fn with_to(mut self, entry: ToEntry<C>) -> Self {
        self.to_list.push(entry);
        self
    }
}

impl<C: Mergeable + Send + Sync> Policy for TestPolicy<C> {
    type Conf = C;

    fn meta(&self) -> Arc<ResourceMeta> {
        self.meta.clone()
    }

    fn target_ref(&self) -> &TargetRef {
        &self.target_ref
    }
}

impl<C: Mergeable + Send + Sync> PolicyWithRules for TestPolicy<C> {
    fn rules(&self) -> &[RuleEntry<C>] {
        &self.rules
    }
}

impl<C: Mergeable + Send + Sync> PolicyWithToList for TestPolicy<C> {
    fn to_list(&self) -> &[ToEntry<C>] {
        &self.to_list
    }
}
