//! In-memory cluster: resources, owned workloads, and a watch stream.
//!
//! Mirrors the store semantics the controller depends on: optimistic
//! concurrency through `resource_version`, deletion blocked by finalizers,
//! and owner garbage collection. Faults and latency can be injected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crmetrics_core::error::{CrMetricsError, Result};
use crmetrics_core::{ResourceIdentity, ResourceSnapshot, TypeMeta, Workload, WorkloadSpec};

use super::{ClusterClient, EventKind, ResourceEvent};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
    Get,
    Update,
    GetOwned,
    CreateOwned,
    UpdateOwned,
    List,
}

pub struct MemoryCluster {
    resources: DashMap<ResourceIdentity, ResourceSnapshot>,
    workloads: DashMap<ResourceIdentity, Workload>,
    events: broadcast::Sender<ResourceEvent>,
    version: AtomicU64,
    faults: Mutex<Vec<(ClusterOp, CrMetricsError)>>,
    latency: Option<Duration>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            resources: DashMap::new(),
            workloads: DashMap::new(),
            events,
            version: AtomicU64::new(1),
            faults: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Every client call sleeps for `latency` first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    /// Create the resource or change its desired size (user-side write).
    pub fn apply(&self, id: &ResourceIdentity, size: u32) -> ResourceSnapshot {
        let rv = self.next_version();
        let stored = match self.resources.entry(id.clone()) {
            Entry::Occupied(mut o) => {
                let snap = o.get_mut();
                snap.spec.size = size;
                snap.resource_version = rv;
                snap.clone()
            }
            Entry::Vacant(v) => {
                let mut snap = ResourceSnapshot::new(id.clone(), size);
                snap.type_meta = TypeMeta::default();
                snap.creation_timestamp = unix_seconds().to_string();
                snap.resource_version = rv;
                v.insert(snap.clone());
                snap
            }
        };
        self.emit(id, EventKind::Applied);
        stored
    }

    /// Insert a fully specified snapshot, replacing any existing one.
    pub fn insert(&self, mut snapshot: ResourceSnapshot) -> ResourceSnapshot {
        snapshot.resource_version = self.next_version();
        let id = snapshot.identity.clone();
        self.resources.insert(id.clone(), snapshot.clone());
        self.emit(&id, EventKind::Applied);
        snapshot
    }

    /// Request deletion. Objects without finalizers disappear immediately;
    /// others are marked terminating until their finalizers are removed.
    /// Returns false if the resource does not exist.
    pub fn request_delete(&self, id: &ResourceIdentity) -> bool {
        let rv = self.next_version();
        let kind = match self.resources.entry(id.clone()) {
            Entry::Vacant(_) => return false,
            Entry::Occupied(o) if o.get().finalizers.is_empty() => {
                o.remove();
                self.workloads.remove(id);
                EventKind::Deleted
            }
            Entry::Occupied(mut o) => {
                let snap = o.get_mut();
                snap.deletion_requested = true;
                snap.resource_version = rv;
                EventKind::Applied
            }
        };
        self.emit(id, kind);
        true
    }

    /// Change the actual replica count behind the controller's back.
    pub fn set_workload_replicas(&self, id: &ResourceIdentity, replicas: u32) -> Option<Workload> {
        let rv = self.next_version();
        let updated = self.workloads.get_mut(id).map(|mut w| {
            w.replicas = replicas;
            w.resource_version = rv;
            w.clone()
        })?;
        // owned-object changes requeue the owner
        self.emit(id, EventKind::Applied);
        Some(updated)
    }

    /// Insert an owned workload directly.
    pub fn insert_workload(&self, id: &ResourceIdentity, replicas: u32) -> Workload {
        let w = Workload {
            identity: id.clone(),
            replicas,
            resource_version: self.next_version(),
        };
        self.workloads.insert(id.clone(), w.clone());
        w
    }

    pub fn resource(&self, id: &ResourceIdentity) -> Option<ResourceSnapshot> {
        self.resources.get(id).map(|r| r.value().clone())
    }

    pub fn workload(&self, id: &ResourceIdentity) -> Option<Workload> {
        self.workloads.get(id).map(|r| r.value().clone())
    }

    /// The next call of `op` fails with `err`.
    pub fn fail_next(&self, op: ClusterOp, err: CrMetricsError) {
        self.lock_faults().push((op, err));
    }

    fn take_fault(&self, op: ClusterOp) -> Result<()> {
        let mut faults = self.lock_faults();
        match faults.iter().position(|(o, _)| *o == op) {
            Some(i) => Err(faults.remove(i).1),
            None => Ok(()),
        }
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Vec<(ClusterOp, CrMetricsError)>> {
        match self.faults.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn enter(&self, op: ClusterOp) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.take_fault(op)
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, id: &ResourceIdentity, kind: EventKind) {
        // no subscribers is fine
        let _ = self.events.send(ResourceEvent {
            identity: id.clone(),
            kind,
        });
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get(&self, id: &ResourceIdentity) -> Result<ResourceSnapshot> {
        self.enter(ClusterOp::Get).await?;
        self.resource(id)
            .ok_or_else(|| CrMetricsError::NotFound(format!("resource {id}")))
    }

    async fn update(&self, snapshot: &ResourceSnapshot) -> Result<ResourceSnapshot> {
        self.enter(ClusterOp::Update).await?;
        let id = &snapshot.identity;
        let rv = self.next_version();

        let (stored, kind) = match self.resources.entry(id.clone()) {
            Entry::Vacant(_) => return Err(CrMetricsError::NotFound(format!("resource {id}"))),
            Entry::Occupied(mut o) => {
                let current = o.get();
                if current.resource_version != snapshot.resource_version {
                    return Err(CrMetricsError::Conflict(format!(
                        "resource {id}: version {} is stale (current {})",
                        snapshot.resource_version, current.resource_version
                    )));
                }
                let mut next = snapshot.clone();
                // server-owned fields
                next.deletion_requested = current.deletion_requested;
                next.creation_timestamp = current.creation_timestamp.clone();
                next.resource_version = rv;

                if next.deletion_requested && next.finalizers.is_empty() {
                    o.remove();
                    (next, EventKind::Deleted)
                } else {
                    o.insert(next.clone());
                    (next, EventKind::Applied)
                }
            }
        };
        if kind == EventKind::Deleted {
            self.workloads.remove(id);
        }
        self.emit(id, kind);
        Ok(stored)
    }

    async fn get_owned(&self, id: &ResourceIdentity) -> Result<Workload> {
        self.enter(ClusterOp::GetOwned).await?;
        self.workload(id)
            .ok_or_else(|| CrMetricsError::NotFound(format!("workload {id}")))
    }

    async fn create_owned(&self, spec: &WorkloadSpec) -> Result<Workload> {
        self.enter(ClusterOp::CreateOwned).await?;
        if !self.resources.contains_key(&spec.owner) {
            return Err(CrMetricsError::NotFound(format!("owner {}", spec.owner)));
        }
        let rv = self.next_version();
        match self.workloads.entry(spec.identity.clone()) {
            Entry::Occupied(_) => Err(CrMetricsError::Conflict(format!(
                "workload {} already exists",
                spec.identity
            ))),
            Entry::Vacant(v) => {
                let w = Workload {
                    identity: spec.identity.clone(),
                    replicas: spec.replicas,
                    resource_version: rv,
                };
                v.insert(w.clone());
                Ok(w)
            }
        }
    }

    async fn update_owned(&self, workload: &Workload) -> Result<Workload> {
        self.enter(ClusterOp::UpdateOwned).await?;
        let id = &workload.identity;
        let rv = self.next_version();
        let mut current = self
            .workloads
            .get_mut(id)
            .ok_or_else(|| CrMetricsError::NotFound(format!("workload {id}")))?;
        if current.resource_version != workload.resource_version {
            return Err(CrMetricsError::Conflict(format!(
                "workload {id}: version {} is stale (current {})",
                workload.resource_version, current.resource_version
            )));
        }
        current.replicas = workload.replicas;
        current.resource_version = rv;
        Ok(current.clone())
    }

    async fn list(&self) -> Result<Vec<ResourceIdentity>> {
        self.enter(ClusterOp::List).await?;
        let mut ids: Vec<ResourceIdentity> = self.resources.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
