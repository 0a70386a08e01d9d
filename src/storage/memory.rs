use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use super::traits::{GraphStore, StorageError, WriteOp};

/// Stored shape of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub kinds: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

/// Stored shape of an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEdge {
    pub properties: BTreeMap<String, Value>,
}

type EdgeKey = (String, String, String);

/// DashMap-backed graph store.
///
/// Keeps a log of committed batch sizes so callers can see exactly how the
/// pipeline grouped its writes. Failures can be injected to exercise the
/// flush error path.
pub struct InMemoryGraphStore {
    nodes: DashMap<String, StoredNode>,
    edges: DashMap<EdgeKey, StoredEdge>,
    commit_log: Mutex<Vec<usize>>,
    // Serialises commits so a batch lands all at once.
    commit_lock: Mutex<()>,
    fail_next: AtomicU64,
    fail_always: AtomicBool,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
            edges: DashMap::new(),
            commit_log: Mutex::new(Vec::new()),
            commit_lock: Mutex::new(()),
            fail_next: AtomicU64::new(0),
            fail_always: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` commits with a backend error.
    pub fn fail_next_commits(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every commit until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.fail_always.store(failing, Ordering::SeqCst);
    }

    /// Sizes of every successful commit, oldest first.
    #[must_use]
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commit_log.lock().clone()
    }

    #[must_use]
    pub fn node(&self, object_id: &str) -> Option<StoredNode> {
        self.nodes.get(object_id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn edge(&self, source: &str, target: &str, kind: &str) -> Option<StoredEdge> {
        let key = (source.to_string(), target.to_string(), kind.to_string());
        self.edges.get(&key).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn clear(&self) {
        self.nodes.clear();
        self.edges.clear();
        self.commit_log.lock().clear();
    }

    fn should_fail(&self) -> bool {
        if self.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn merge(
        target: &mut BTreeMap<String, Value>,
        properties: BTreeMap<String, Value>,
        deleted: &[String],
    ) {
        target.extend(properties);
        for key in deleted {
            target.remove(key);
        }
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn commit(&self, ops: Vec<WriteOp>) -> Result<usize, StorageError> {
        let _guard = self.commit_lock.lock();

        if self.should_fail() {
            return Err(StorageError::Backend("injected commit failure".into()));
        }

        let written = ops.len();
        for op in ops {
            match op {
                WriteOp::UpsertNode { object_id, kinds, properties, deleted } => {
                    let mut entry = self.nodes.entry(object_id).or_insert_with(|| StoredNode {
                        kinds: Vec::new(),
                        properties: BTreeMap::new(),
                    });
                    entry.kinds = kinds;
                    Self::merge(&mut entry.properties, properties, &deleted);
                }
                WriteOp::UpsertEdge { source, target, kind, properties, deleted } => {
                    let mut entry = self
                        .edges
                        .entry((source, target, kind))
                        .or_insert_with(|| StoredEdge { properties: BTreeMap::new() });
                    Self::merge(&mut entry.properties, properties, &deleted);
                }
            }
        }

        self.commit_log.lock().push(written);
        Ok(written)
    }

    async fn node_count(&self) -> Result<u64, StorageError> {
        Ok(self.nodes.len() as u64)
    }

    async fn edge_count(&self) -> Result<u64, StorageError> {
        Ok(self.edges.len() as u64)
    }
}
