//! Resource data model: identities, observed snapshots, and owned workloads.
//!
//! Snapshots are read-only views fetched fresh for every reconciliation pass.
//! The only durable controller state lives here as the finalizer token.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Finalizer token that blocks physical deletion until metric cleanup ran.
pub const FINALIZER: &str = "cleanup-summary-metrics";

/// Default type metadata of the managed resource.
pub const DEFAULT_API_VERSION: &str = "cache.example.com/v1alpha1";
pub const DEFAULT_KIND: &str = "Memcached";

/// Immutable key of a resource: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    /// API group, i.e. the part of `apiVersion` before `/` (empty for the core group).
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _version)) => group,
            None => "",
        }
    }
}

impl Default for TypeMeta {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            kind: DEFAULT_KIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Desired replica count of the owned workload.
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Observed state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub identity: ResourceIdentity,
    #[serde(default)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub creation_timestamp: String,
    #[serde(default)]
    pub finalizers: BTreeSet<String>,
    #[serde(default)]
    pub deletion_requested: bool,
    pub spec: ResourceSpec,
    #[serde(default)]
    pub status: ResourceStatus,
    /// Optimistic-concurrency token; writes with a stale version conflict.
    #[serde(default)]
    pub resource_version: u64,
}

impl ResourceSnapshot {
    pub fn new(identity: ResourceIdentity, size: u32) -> Self {
        Self {
            identity,
            type_meta: TypeMeta::default(),
            creation_timestamp: String::new(),
            finalizers: BTreeSet::new(),
            deletion_requested: false,
            spec: ResourceSpec { size },
            status: ResourceStatus::default(),
            resource_version: 0,
        }
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.contains(token)
    }

    /// Returns true if the token was not present before.
    pub fn add_finalizer(&mut self, token: &str) -> bool {
        self.finalizers.insert(token.to_string())
    }

    /// Returns true if the token was present.
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        self.finalizers.remove(token)
    }
}

/// Owned workload (a deployment) kept at the resource's desired size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub identity: ResourceIdentity,
    pub replicas: u32,
    #[serde(default)]
    pub resource_version: u64,
}

/// Creation request for an owned workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub identity: ResourceIdentity,
    pub replicas: u32,
    /// Owning resource, used for garbage collection by the cluster.
    pub owner: ResourceIdentity,
}
