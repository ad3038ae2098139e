//! Generic resource model pushed to the managed system.
//!
//! Resources are kept in a deterministic order so that two generations from
//! equal inputs are identical, element by element.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label naming the tool that manages a resource.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Label naming the component that owns a resource.
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
/// Value of [`MANAGED_BY_LABEL`] on everything cfgward generates.
pub const MANAGER_NAME: &str = "cfgward";

/// A single object to be applied to the managed system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    /// `None` for cluster-scoped resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Kind-specific payload.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl Resource {
    /// Create a namespaced resource with an empty body.
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
            labels: BTreeMap::new(),
            body: serde_json::Value::Null,
        }
    }

    /// Create a cluster-scoped resource with an empty body.
    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: None,
            name: name.into(),
            labels: BTreeMap::new(),
            body: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// The identity of this resource within the managed system.
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind.clone(),
            namespace: self.namespace.clone().unwrap_or_default(),
            name: self.name.clone(),
        }
    }
}

/// Identity of a resource: kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: String,
    /// Empty for cluster-scoped resources.
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Sort resources by their rendered `kind/namespace/name` key.
///
/// The sort is stable, so resources sharing a key keep their relative order.
pub fn sort_resources(resources: &mut [Resource]) {
    resources.sort_by_cached_key(|r| r.key().to_string());
}

/// Labels stamped on every resource generated for `component`.
pub fn common_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}
