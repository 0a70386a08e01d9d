// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::storage::{StorageError, WriteBatch, WriteOp};
use super::{digest_u64, update_field, ChangeRecord, HashError, IgnoreSet, Properties};

/// Proposed upsert of a single node, keyed by its external object id.
#[derive(Debug, Clone)]
pub struct NodeChange {
    pub object_id: String,
    pub kinds: Vec<String>,
    pub properties: Properties,
    ignored: Arc<IgnoreSet>,
}

impl NodeChange {
    pub fn new<I, S>(object_id: impl Into<String>, kinds: I, properties: Properties) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object_id: object_id.into(),
            kinds: kinds.into_iter().map(Into::into).collect(),
            properties,
            ignored: IgnoreSet::volatile(),
        }
    }

    /// Replace the default volatile-key set used for content hashing.
    #[must_use]
    pub fn with_ignored(mut self, ignored: Arc<IgnoreSet>) -> Self {
        self.ignored = ignored;
        self
    }
}

impl ChangeRecord for NodeChange {
    fn identity_key(&self) -> Result<u64, HashError> {
        if self.object_id.is_empty() {
            return Err(HashError::MissingIdentity("node object id is empty"));
        }
        let mut hasher = Sha256::new();
        hasher.update(b"node");
        update_field(&mut hasher, &self.object_id);
        Ok(digest_u64(hasher))
    }

    fn content_hash(&self) -> Result<u64, HashError> {
        let mut kinds: Vec<&str> = self.kinds.iter().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds.dedup();

        let mut hasher = Sha256::new();
        for kind in kinds {
            update_field(&mut hasher, kind);
        }
        hasher.update(b"|");
        self.properties.hash_into(&mut hasher, &self.ignored)?;
        Ok(digest_u64(hasher))
    }

    fn apply(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        if self.object_id.is_empty() {
            return Err(StorageError::InvalidRecord("node without object id".into()));
        }
        batch.push(WriteOp::UpsertNode {
            object_id: self.object_id.clone(),
            kinds: self.kinds.clone(),
            properties: self.properties.values().clone(),
            deleted: self.properties.deleted().map(str::to_string).collect(),
        });
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.object_id.is_empty()
    }
}

/// Proposed upsert of a single edge, keyed by (source, target, kind).
#[derive(Debug, Clone)]
pub struct EdgeChange {
    pub source: String,
    pub target: String,
    pub kind: String,
    pub properties: Properties,
    ignored: Arc<IgnoreSet>,
}

impl EdgeChange {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: impl Into<String>,
        properties: Properties,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: kind.into(),
            properties,
            ignored: IgnoreSet::volatile(),
        }
    }

    #[must_use]
    pub fn with_ignored(mut self, ignored: Arc<IgnoreSet>) -> Self {
        self.ignored = ignored;
        self
    }
}

impl ChangeRecord for EdgeChange {
    fn identity_key(&self) -> Result<u64, HashError> {
        if self.source.is_empty() || self.target.is_empty() || self.kind.is_empty() {
            return Err(HashError::MissingIdentity("edge requires source, target and kind"));
        }
        let mut hasher = Sha256::new();
        hasher.update(b"edge");
        update_field(&mut hasher, &self.source);
        update_field(&mut hasher, &self.target);
        update_field(&mut hasher, &self.kind);
        Ok(digest_u64(hasher))
    }

    fn content_hash(&self) -> Result<u64, HashError> {
        let mut hasher = Sha256::new();
        self.properties.hash_into(&mut hasher, &self.ignored)?;
        Ok(digest_u64(hasher))
    }

    fn apply(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        if self.is_empty() {
            return Err(StorageError::InvalidRecord("edge without endpoints".into()));
        }
        batch.push(WriteOp::UpsertEdge {
            source: self.source.clone(),
            target: self.target.clone(),
            kind: self.kind.clone(),
            properties: self.properties.values().clone(),
            deleted: self.properties.deleted().map(str::to_string).collect(),
        });
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.source.is_empty() || self.target.is_empty() || self.kind.is_empty()
    }
}

/// Either kind of graph change.
#[derive(Debug, Clone)]
pub enum Change {
    Node(NodeChange),
    Edge(EdgeChange),
}

impl From<NodeChange> for Change {
    fn from(change: NodeChange) -> Self {
        Change::Node(change)
    }
}

impl From<EdgeChange> for Change {
    fn from(change: EdgeChange) -> Self {
        Change::Edge(change)
    }
}

impl ChangeRecord for Change {
    fn identity_key(&self) -> Result<u64, HashError> {
        match self {
            Change::Node(c) => c.identity_key(),
            Change::Edge(c) => c.identity_key(),
        }
    }

    fn content_hash(&self) -> Result<u64, HashError> {
        match self {
            Change::Node(c) => c.content_hash(),
            Change::Edge(c) => c.content_hash(),
        }
    }

    fn apply(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        match self {
            Change::Node(c) => c.apply(batch),
            Change::Edge(c) => c.apply(batch),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Change::Node(c) => c.is_empty(),
            Change::Edge(c) => c.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str, name: &str, lastseen: &str) -> NodeChange {
        NodeChange::new(
            id,
            ["User"],
            Properties::new()
                .with("objectid", id)
                .with("name", name)
                .with("lastseen", lastseen),
        )
    }

    #[test]
    fn test_node_identity_is_stable() {
        let a = user("u1", "alice", "t1");
        let b = user("u1", "bob", "t2");
        assert_eq!(a.identity_key().unwrap(), b.identity_key().unwrap());
        assert_ne!(a.identity_key().unwrap(), user("u2", "alice", "t1").identity_key().unwrap());
    }

    #[test]
    fn test_node_content_ignores_volatile_fields() {
        let a = user("u1", "alice", "2025-01-01");
        let b = user("u1", "alice", "2025-03-01");
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_node_content_tracks_real_changes() {
        let a = user("u1", "alice", "t1");
        let b = user("u1", "alice-renamed", "t1");
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_node_kind_order_does_not_matter() {
        let a = NodeChange::new("u1", ["User", "Base"], Properties::new());
        let b = NodeChange::new("u1", ["Base", "User"], Properties::new());
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());

        let c = NodeChange::new("u1", ["Computer"], Properties::new());
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    }

    #[test]
    fn test_custom_ignore_set() {
        let ignored = Arc::new(IgnoreSet::new(["name"]));
        let a = user("u1", "alice", "t1").with_ignored(ignored.clone());
        let b = user("u1", "bob", "t1").with_ignored(ignored);
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());

        // lastseen is no longer ignored
        let c = user("u1", "alice", "t2").with_ignored(Arc::new(IgnoreSet::new(["name"])));
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    }

    #[test]
    fn test_empty_object_id_is_hash_error() {
        let change = NodeChange::new("", ["User"], Properties::new());
        assert!(matches!(change.identity_key(), Err(HashError::MissingIdentity(_))));
        assert!(change.is_empty());
    }

    #[test]
    fn test_edge_identity_covers_all_key_parts() {
        let base = EdgeChange::new("a", "b", "MemberOf", Properties::new());
        let swapped = EdgeChange::new("b", "a", "MemberOf", Properties::new());
        let other_kind = EdgeChange::new("a", "b", "AdminTo", Properties::new());

        let key = base.identity_key().unwrap();
        assert_ne!(key, swapped.identity_key().unwrap());
        assert_ne!(key, other_kind.identity_key().unwrap());
    }

    #[test]
    fn test_edge_field_boundaries_do_not_collide() {
        let a = EdgeChange::new("ab", "c", "K", Properties::new());
        let b = EdgeChange::new("a", "bc", "K", Properties::new());
        assert_ne!(a.identity_key().unwrap(), b.identity_key().unwrap());
    }

    #[test]
    fn test_edge_content_ignores_inherited_flag() {
        let a = EdgeChange::new("a", "b", "GenericAll", Properties::new().with("isinherited", true));
        let b = EdgeChange::new("a", "b", "GenericAll", Properties::new().with("isinherited", false));
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_apply_writes_full_properties() {
        let mut batch = WriteBatch::new();
        let mut props = Properties::new().with("name", "alice").with("lastseen", "t1");
        props.delete("description");
        NodeChange::new("u1", ["User"], props).apply(&mut batch).unwrap();

        let ops = batch.into_ops();
        match &ops[0] {
            WriteOp::UpsertNode { object_id, kinds, properties, deleted } => {
                assert_eq!(object_id, "u1");
                assert_eq!(kinds, &vec!["User".to_string()]);
                // volatile keys are still persisted, only hashing skips them
                assert_eq!(properties["lastseen"], json!("t1"));
                assert_eq!(deleted, &vec!["description".to_string()]);
            }
            other => panic!("unexpected op {:?}", other),
        }
    }

    #[test]
    fn test_change_enum_delegates() {
        let node = user("u1", "alice", "t1");
        let change: Change = node.clone().into();
        assert_eq!(change.identity_key().unwrap(), node.identity_key().unwrap());
        assert_eq!(change.content_hash().unwrap(), node.content_hash().unwrap());

        let edge: Change = EdgeChange::new("a", "b", "MemberOf", Properties::new()).into();
        let mut batch = WriteBatch::new();
        edge.apply(&mut batch).unwrap();
        assert!(matches!(batch.into_ops()[0], WriteOp::UpsertEdge { .. }));
    }

    #[test]
    fn test_node_and_edge_keys_live_in_separate_domains() {
        let node = NodeChange::new("a", ["User"], Properties::new());
        let edge = EdgeChange::new("a", "a", "a", Properties::new());
        assert_ne!(node.identity_key().unwrap(), edge.identity_key().unwrap());
    }
}
