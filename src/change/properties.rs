// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property bags and the volatile-key ignore set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use super::{update_bytes, update_field, HashError};

/// Keys that change on every observation without meaning anything changed.
pub const DEFAULT_IGNORED_KEYS: &[&str] = &[
    "objectid",
    "lastseen",
    "lastcollected",
    "isinherited",
    "domainsid",
    "isacl",
    "tenantid",
];

/// Property keys excluded from content hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    keys: BTreeSet<String>,
}

impl IgnoreSet {
    #[must_use]
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { keys: keys.into_iter().map(Into::into).collect() }
    }

    /// Shared instance of [`DEFAULT_IGNORED_KEYS`].
    #[must_use]
    pub fn volatile() -> Arc<IgnoreSet> {
        static VOLATILE: OnceLock<Arc<IgnoreSet>> = OnceLock::new();
        VOLATILE
            .get_or_init(|| Arc::new(IgnoreSet::new(DEFAULT_IGNORED_KEYS.iter().copied())))
            .clone()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Ordered property bag with tombstones for deleted keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    deleted: BTreeSet<String>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        self.deleted.remove(&key);
        self.values.insert(key, value.into());
        self
    }

    /// Mark a key deleted. A deletion is itself a persistable change.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.values.remove(&key);
        self.deleted.insert(key);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.deleted.is_empty()
    }

    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Feed the comparable part of the bag into `hasher`.
    ///
    /// Keys are visited in sorted order so insertion order never matters.
    /// Every entry is tagged and length-prefixed, so no key or value can
    /// spill into its neighbour.
    pub(crate) fn hash_into(&self, hasher: &mut Sha256, ignored: &IgnoreSet) -> Result<(), HashError> {
        for (key, value) in self.values.iter().filter(|(k, _)| !ignored.contains(k)) {
            let encoded = serde_json::to_vec(value)
                .map_err(|e| HashError::Encode { key: key.clone(), reason: e.to_string() })?;
            hasher.update(b"+");
            update_field(hasher, key);
            update_bytes(hasher, &encoded);
        }
        for key in self.deleted.iter().filter(|k| !ignored.contains(k)) {
            hasher.update(b"-");
            update_field(hasher, key);
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}
