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

use timewindow::error::ErrorKind;
use timewindow::store::Keyspace;
use timewindow::store::KeyspaceEvent;
use timewindow::store::MemoryKeyspace;
use timewindow::store::Value;
use timewindow::store::command;
use timewindow::window::BucketInterval;
use timewindow::window::WindowedUniqueEstimator;

/// An estimator whose only sketch has a damaged magic tag.
fn corrupted_estimator() -> WindowedUniqueEstimator {
    let mut estimator: WindowedUniqueEstimator = WindowedUniqueEstimator::new(0);
    estimator
        .hit(BucketInterval::new(60).unwrap(), b"seed", 0)
        .unwrap();
    let mut bytes = estimator.serialize().unwrap();
    // First sketch byte, after the 12 byte header and the slot length word.
    bytes[16] = b'X';
    WindowedUniqueEstimator::deserialize(&bytes).unwrap()
}

#[test]
fn test_counter_commands() {
    let mut keyspace = MemoryKeyspace::new();
    for (amount, timestamp) in [(5, 0), (3, 30), (2, 600)] {
        command::hit(&mut keyspace, 60, amount, timestamp, &["K"]).unwrap();
    }
    assert_eq!(command::calc(&keyspace, 600, b"K").unwrap(), 10);
    assert_eq!(command::calc(&keyspace, 60 * 42, b"K").unwrap(), 0);
    assert_eq!(keyspace.dirty(), 3);
    assert!(keyspace.events().iter().all(|e| e.event == "tahit"));
}

#[test]
fn test_read_commands_on_missing_or_foreign_keys() {
    let mut keyspace = MemoryKeyspace::new();
    let err = command::calc(&keyspace, 0, b"missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchKey);

    command::unique_hit(&mut keyspace, 60, b"x", 0, &["U"]).unwrap();
    let err = command::calc(&keyspace, 0, b"U").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongType);

    command::hit(&mut keyspace, 60, 1, 0, &["C"]).unwrap();
    let err = command::unique_calc(&keyspace, 60, 0, b"C").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongType);
}

#[test]
fn test_unique_duplicate_hit_through_keyspace() {
    let mut keyspace = MemoryKeyspace::new();
    let first = command::unique_hit(&mut keyspace, 3600, b"alice", 0, &["K"]).unwrap();
    let second = command::unique_hit(&mut keyspace, 3600, b"alice", 0, &["K"]).unwrap();
    assert_eq!(first[0].as_ref().unwrap(), second[0].as_ref().unwrap());
    assert_eq!(command::unique_calc(&keyspace, 3600, 10, b"K").unwrap(), (1, 0));
}

#[test]
fn test_corrupted_sketch_stops_multi_key_call() {
    let mut keyspace = MemoryKeyspace::new();
    keyspace.insert(b"bad", Value::Unique(corrupted_estimator()));

    let replies =
        command::unique_hit(&mut keyspace, 60, b"alice", 0, &["good", "bad", "later"]).unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].as_ref().unwrap(), &1);
    assert_eq!(
        replies[1].as_ref().unwrap_err().kind(),
        ErrorKind::CorruptedSketch
    );

    // The write before the failure stands; the key after it was never touched.
    assert_eq!(command::unique_calc(&keyspace, 60, 0, b"good").unwrap(), (1, 0));
    assert!(!keyspace.contains_key(b"later"));
    assert_eq!(
        keyspace.events(),
        &[KeyspaceEvent {
            event: "tuhit",
            key: b"good".to_vec(),
        }]
    );
}

#[test]
fn test_wrong_type_key_does_not_stop_unique_call() {
    let mut keyspace = MemoryKeyspace::new();
    command::hit(&mut keyspace, 60, 1, 0, &["counter"]).unwrap();

    let replies =
        command::unique_bulk_hit(&mut keyspace, 60, b"a\0b\0c", 0, &["counter", "u"]).unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].as_ref().unwrap_err().kind(), ErrorKind::WrongType);
    assert!(replies[1].is_ok());
    assert_eq!(command::unique_calc(&keyspace, 60, 0, b"u").unwrap(), (3, 0));
    assert_eq!(keyspace.events().last().unwrap().event, "tuupdate");
}

#[test]
fn test_empty_element_counts_in_single_and_bulk_hits() {
    let mut keyspace = MemoryKeyspace::new();
    command::unique_hit(&mut keyspace, 60, b"", 0, &["single"]).unwrap();
    command::unique_bulk_hit(&mut keyspace, 60, b"", 0, &["bulk"]).unwrap();
    assert_eq!(command::unique_calc(&keyspace, 60, 0, b"single").unwrap(), (1, 0));
    assert_eq!(command::unique_calc(&keyspace, 60, 0, b"bulk").unwrap(), (1, 0));
    assert_eq!(keyspace.dirty(), 2);

    // Repeating the element changes nothing, so the host is not told.
    command::unique_bulk_hit(&mut keyspace, 60, b"", 30, &["bulk"]).unwrap();
    assert_eq!(keyspace.dirty(), 2);
}

#[test]
fn test_hit_expiring_only_on_change() {
    let mut keyspace = MemoryKeyspace::new();
    command::hit_expiring(&mut keyspace, 10, 1, 1_000, &["K"]).unwrap();
    assert_eq!(keyspace.expire_at(b"K"), Some(1_000 + 10 * 32));

    // A write older than the window changes nothing, expiry included.
    command::hit_expiring(&mut keyspace, 10, 1, 0, &["K"]).unwrap();
    assert_eq!(keyspace.expire_at(b"K"), Some(1_000 + 10 * 32));
    assert_eq!(keyspace.dirty(), 1);
}

#[test]
fn test_values_survive_persistence() {
    let mut keyspace = MemoryKeyspace::new();
    command::hit(&mut keyspace, 60, 4, 0, &["C"]).unwrap();
    command::unique_bulk_hit(&mut keyspace, 60, b"x\0y", 0, &["U"]).unwrap();

    let mut restored = MemoryKeyspace::new();
    for key in [b"C", b"U"] {
        let value = match keyspace.get(key).unwrap() {
            Value::Counter(counter) => Value::Counter(
                timewindow::window::WindowedCounter::deserialize(&counter.serialize()).unwrap(),
            ),
            Value::Unique(estimator) => Value::Unique(
                WindowedUniqueEstimator::deserialize(&estimator.serialize().unwrap()).unwrap(),
            ),
            Value::Bytes(bytes) => Value::Bytes(bytes.clone()),
        };
        restored.insert(key, value);
    }
    assert_eq!(command::calc(&restored, 0, b"C").unwrap(), 4);
    assert_eq!(command::unique_calc(&restored, 60, 0, b"U").unwrap(), (2, 0));
}
