// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::HashMap;

use crate::store::Keyspace;
use crate::store::Value;

/// A change notification recorded by [`MemoryKeyspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceEvent {
    pub event: &'static str,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expire_at: Option<i64>,
}

/// An in-memory [`Keyspace`].
///
/// Records every notification in order and counts them in a dirty counter, the way
/// a persistent host would count writes since its last save. Expiry times are
/// recorded but never enforced.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyspace {
    entries: HashMap<Vec<u8>, Entry>,
    events: Vec<KeyspaceEvent>,
    dirty: u64,
}

impl MemoryKeyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the expiry time of `key`, if one was set.
    pub fn expire_at(&self, key: &[u8]) -> Option<i64> {
        self.entries.get(key).and_then(|entry| entry.expire_at)
    }

    /// Notifications received so far, oldest first.
    pub fn events(&self) -> &[KeyspaceEvent] {
        &self.events
    }

    /// Number of notifications received so far.
    pub fn dirty(&self) -> u64 {
        self.dirty
    }
}

impl Keyspace for MemoryKeyspace {
    fn get(&self, key: &[u8]) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    fn insert(&mut self, key: &[u8], value: Value) {
        self.entries.insert(
            key.to_vec(),
            Entry {
                value,
                expire_at: None,
            },
        );
    }

    fn notify_modified(&mut self, event: &'static str, key: &[u8]) {
        tracing::trace!(event, key = %String::from_utf8_lossy(key), "keyspace event");
        self.events.push(KeyspaceEvent {
            event,
            key: key.to_vec(),
        });
        self.dirty += 1;
    }

    fn set_expire_at(&mut self, key: &[u8], at: i64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expire_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_value_and_expiry() {
        let mut keyspace = MemoryKeyspace::new();
        keyspace.insert(b"k", Value::Bytes(vec![1]));
        keyspace.set_expire_at(b"k", 100);
        assert_eq!(keyspace.expire_at(b"k"), Some(100));

        keyspace.insert(b"k", Value::Bytes(vec![2]));
        assert_eq!(keyspace.expire_at(b"k"), None);
        assert_eq!(keyspace.get(b"k"), Some(&Value::Bytes(vec![2])));
        assert_eq!(keyspace.len(), 1);
    }

    #[test]
    fn test_expiry_on_missing_key_is_ignored() {
        let mut keyspace = MemoryKeyspace::new();
        keyspace.set_expire_at(b"k", 100);
        assert!(keyspace.is_empty());
        assert_eq!(keyspace.expire_at(b"k"), None);
    }

    #[test]
    fn test_notifications_count_as_dirty() {
        let mut keyspace = MemoryKeyspace::new();
        keyspace.notify_modified("tahit", b"a");
        keyspace.notify_modified("tuhit", b"b");
        assert_eq!(keyspace.dirty(), 2);
        assert_eq!(
            keyspace.events()[1],
            KeyspaceEvent {
                event: "tuhit",
                key: b"b".to_vec()
            }
        );
    }
}
