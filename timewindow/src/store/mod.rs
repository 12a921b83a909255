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

//! Windowed values stored under keys of a host key-value store.
//!
//! The host is abstracted by [`Keyspace`]: typed lookup, change notification and
//! expiry. [`MemoryKeyspace`] is an in-memory host. The functions in [`command`]
//! implement the key-level commands on top of any [`Keyspace`].
//!
//! ```rust
//! # use timewindow::store::MemoryKeyspace;
//! # use timewindow::store::command;
//! let mut keyspace = MemoryKeyspace::new();
//! let replies = command::unique_hit(&mut keyspace, 3600, b"alice", 0, &["K"]).unwrap();
//! assert_eq!(replies[0].as_ref().unwrap(), &1);
//! assert_eq!(command::unique_calc(&keyspace, 3600, 0, b"K").unwrap(), (1, 0));
//! ```

pub mod command;
mod memory;

pub use self::memory::KeyspaceEvent;
pub use self::memory::MemoryKeyspace;

use crate::error::Error;
use crate::window::WindowedCounter;
use crate::window::WindowedUniqueEstimator;

/// A value held under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A rolling sum.
    Counter(WindowedCounter),
    /// A rolling distinct-count estimate.
    Unique(WindowedUniqueEstimator),
    /// Any other value of the host.
    Bytes(Vec<u8>),
}

/// The host store the commands run against.
///
/// Implementations serialize access per key; the commands never hold a value across
/// calls.
pub trait Keyspace {
    /// Returns the value under `key`.
    fn get(&self, key: &[u8]) -> Option<&Value>;

    /// Returns the value under `key` for writing.
    fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn insert(&mut self, key: &[u8], value: Value);

    /// Called once for every key a command mutated.
    fn notify_modified(&mut self, event: &'static str, key: &[u8]);

    /// Sets the absolute expiry time of `key`.
    fn set_expire_at(&mut self, key: &[u8], at: i64);
}

/// A value kind that can live under a key.
pub trait StoredValue: Sized {
    /// Human-readable name of the kind, reported by wrong-type errors.
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<&Self>;

    fn from_value_mut(value: &mut Value) -> Option<&mut Self>;

    fn into_value(self) -> Value;
}

impl StoredValue for WindowedCounter {
    const TYPE_NAME: &'static str = "windowed counter";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Counter(self)
    }
}

impl StoredValue for WindowedUniqueEstimator {
    const TYPE_NAME: &'static str = "windowed unique estimator";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Unique(estimator) => Some(estimator),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Unique(estimator) => Some(estimator),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Unique(self)
    }
}

/// Returns the value of kind `T` under `key`, storing `create()` first if the key is
/// missing.
///
/// Fails with [`WrongType`](crate::error::ErrorKind::WrongType) if the key holds
/// another kind.
pub fn lookup_or_create<'a, T, K>(
    keyspace: &'a mut K,
    key: &[u8],
    create: impl FnOnce() -> T,
) -> Result<&'a mut T, Error>
where
    T: StoredValue,
    K: Keyspace + ?Sized,
{
    if keyspace.get(key).is_none() {
        keyspace.insert(key, create().into_value());
    }
    let value = keyspace.get_mut(key).ok_or_else(Error::no_such_key)?;
    T::from_value_mut(value).ok_or_else(|| Error::wrong_type(T::TYPE_NAME))
}

/// Returns the value of kind `T` under `key`.
///
/// Fails with [`NoSuchKey`](crate::error::ErrorKind::NoSuchKey) if the key is
/// missing, or [`WrongType`](crate::error::ErrorKind::WrongType) if it holds another
/// kind.
pub fn lookup<'a, T, K>(keyspace: &'a K, key: &[u8]) -> Result<&'a T, Error>
where
    T: StoredValue,
    K: Keyspace + ?Sized,
{
    let value = keyspace.get(key).ok_or_else(Error::no_such_key)?;
    T::from_value(value).ok_or_else(|| Error::wrong_type(T::TYPE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_lookup_or_create_inserts_once() {
        let mut keyspace = MemoryKeyspace::new();
        let counter =
            lookup_or_create::<WindowedCounter, _>(&mut keyspace, b"k", WindowedCounter::new)
                .unwrap();
        assert_eq!(counter.interval(), None);
        assert!(keyspace.contains_key(b"k"));

        let err = lookup_or_create::<WindowedUniqueEstimator, _>(&mut keyspace, b"k", || {
            WindowedUniqueEstimator::new(0)
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongType);
        assert!(matches!(keyspace.get(b"k"), Some(Value::Counter(_))));
    }

    #[test]
    fn test_lookup_missing_and_wrong_type() {
        let mut keyspace = MemoryKeyspace::new();
        let err = lookup::<WindowedCounter, _>(&keyspace, b"k").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchKey);

        keyspace.insert(b"k", Value::Bytes(b"plain".to_vec()));
        let err = lookup::<WindowedCounter, _>(&keyspace, b"k").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongType);
        insta::assert_snapshot!(
            err.to_string(),
            @"WrongType, context: { expected: windowed counter } => operation against a key holding the wrong kind of value"
        );
    }
}
