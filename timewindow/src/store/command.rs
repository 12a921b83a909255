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

//! Key-level commands.
//!
//! Arguments are validated before any key is touched; an invalid argument fails the
//! whole call. Multi-key commands then return one reply per key. A key holding
//! another kind of value fails only its own reply. A corrupted sketch fails its
//! reply and ends the call, so later keys get no reply at all, while writes to
//! earlier keys stand.

use crate::error::Error;
use crate::error::ErrorKind;
use crate::store::Keyspace;
use crate::store::lookup;
use crate::store::lookup_or_create;
use crate::window::BucketInterval;
use crate::window::DEFAULT_NUM_BUCKETS;
use crate::window::HitOutcome;
use crate::window::WindowedCounter;
use crate::window::WindowedUniqueEstimator;

/// Event sent when [`hit`] or [`hit_expiring`] changes a counter.
pub const COUNTER_HIT_EVENT: &str = "tahit";
/// Event sent when [`unique_hit`] changes an estimator.
pub const UNIQUE_HIT_EVENT: &str = "tuhit";
/// Event sent when [`unique_bulk_hit`] changes an estimator.
pub const UNIQUE_BULK_HIT_EVENT: &str = "tuupdate";

/// Adds `amount` to the counter under each key and replies with its window sum.
pub fn hit<K, Key>(
    keyspace: &mut K,
    interval: i64,
    amount: i64,
    timestamp: i64,
    keys: &[Key],
) -> Result<Vec<Result<i64, Error>>, Error>
where
    K: Keyspace + ?Sized,
    Key: AsRef<[u8]>,
{
    let interval = BucketInterval::new(interval)?;
    let amount = bucket_amount(amount)?;
    Ok(keys
        .iter()
        .map(|key| {
            hit_counter(keyspace, interval, amount, timestamp, key.as_ref())
                .map(|outcome| outcome.total)
        })
        .collect())
}

/// Like [`hit`], and sets each changed key to expire once the whole window has
/// passed: at `timestamp + interval * N`.
pub fn hit_expiring<K, Key>(
    keyspace: &mut K,
    interval: i64,
    amount: i64,
    timestamp: i64,
    keys: &[Key],
) -> Result<Vec<Result<i64, Error>>, Error>
where
    K: Keyspace + ?Sized,
    Key: AsRef<[u8]>,
{
    let interval = BucketInterval::new(interval)?;
    let amount = bucket_amount(amount)?;
    let window = i64::from(interval.get()) * DEFAULT_NUM_BUCKETS as i64;
    let expire_at = timestamp.saturating_add(window);
    Ok(keys
        .iter()
        .map(|key| -> Result<i64, Error> {
            let key = key.as_ref();
            let outcome = hit_counter(keyspace, interval, amount, timestamp, key)?;
            if outcome.modified {
                keyspace.set_expire_at(key, expire_at);
            }
            Ok(outcome.total)
        })
        .collect())
}

/// Returns the window sum of the counter under `key` at `timestamp`.
pub fn calc<K>(keyspace: &K, timestamp: i64, key: &[u8]) -> Result<i64, Error>
where
    K: Keyspace + ?Sized,
{
    let counter = lookup::<WindowedCounter, _>(keyspace, key)?;
    Ok(counter.query(timestamp))
}

/// Adds `element` to the estimator under each key and replies with its window total.
pub fn unique_hit<K, Key>(
    keyspace: &mut K,
    interval: i64,
    element: &[u8],
    timestamp: i64,
    keys: &[Key],
) -> Result<Vec<Result<i64, Error>>, Error>
where
    K: Keyspace + ?Sized,
    Key: AsRef<[u8]>,
{
    let interval = BucketInterval::new(interval)?;
    Ok(until_corrupted(keys, |key| {
        let estimator = lookup_or_create::<WindowedUniqueEstimator, _>(keyspace, key, || {
            WindowedUniqueEstimator::new(timestamp)
        })?;
        let outcome = estimator.hit(interval, element, timestamp)?;
        notify_if_modified(keyspace, UNIQUE_HIT_EVENT, key, outcome);
        Ok(outcome.total)
    }))
}

/// Adds every NUL-delimited element of `elements` to the estimator under each key.
pub fn unique_bulk_hit<K, Key>(
    keyspace: &mut K,
    interval: i64,
    elements: &[u8],
    timestamp: i64,
    keys: &[Key],
) -> Result<Vec<Result<(), Error>>, Error>
where
    K: Keyspace + ?Sized,
    Key: AsRef<[u8]>,
{
    let interval = BucketInterval::new(interval)?;
    Ok(until_corrupted(keys, |key| {
        let estimator = lookup_or_create::<WindowedUniqueEstimator, _>(keyspace, key, || {
            WindowedUniqueEstimator::new(timestamp)
        })?;
        let outcome = estimator.bulk_hit(interval, elements, timestamp)?;
        notify_if_modified(keyspace, UNIQUE_BULK_HIT_EVENT, key, outcome);
        Ok(())
    }))
}

/// Returns the window total of the estimator under `key` at `timestamp`, and its
/// creation time.
///
/// The total is zero if the estimator was written with another interval.
pub fn unique_calc<K>(
    keyspace: &K,
    interval: i64,
    timestamp: i64,
    key: &[u8],
) -> Result<(i64, i64), Error>
where
    K: Keyspace + ?Sized,
{
    let interval = BucketInterval::new(interval)?;
    let estimator = lookup::<WindowedUniqueEstimator, _>(keyspace, key)?;
    if estimator.interval() != Some(interval) {
        return Ok((0, estimator.created_time()));
    }
    Ok(estimator.query(timestamp))
}

fn bucket_amount(amount: i64) -> Result<u32, Error> {
    u32::try_from(amount).map_err(|_| {
        Error::invalid_argument(format!("amount must be in 0..={}, got {amount}", u32::MAX))
    })
}

fn hit_counter<K>(
    keyspace: &mut K,
    interval: BucketInterval,
    amount: u32,
    timestamp: i64,
    key: &[u8],
) -> Result<HitOutcome, Error>
where
    K: Keyspace + ?Sized,
{
    let counter = lookup_or_create::<WindowedCounter, _>(keyspace, key, WindowedCounter::new)?;
    let outcome = counter.hit(interval, amount, timestamp);
    notify_if_modified(keyspace, COUNTER_HIT_EVENT, key, outcome);
    Ok(outcome)
}

fn notify_if_modified<K>(keyspace: &mut K, event: &'static str, key: &[u8], outcome: HitOutcome)
where
    K: Keyspace + ?Sized,
{
    if outcome.modified {
        keyspace.notify_modified(event, key);
    }
}

/// Runs `apply` on each key in order, stopping after the first corrupted sketch.
fn until_corrupted<Key, T>(
    keys: &[Key],
    mut apply: impl FnMut(&[u8]) -> Result<T, Error>,
) -> Vec<Result<T, Error>>
where
    Key: AsRef<[u8]>,
{
    let mut replies = Vec::with_capacity(keys.len());
    for key in keys {
        let reply = apply(key.as_ref());
        let corrupted = matches!(&reply, Err(err) if err.kind() == ErrorKind::CorruptedSketch);
        replies.push(reply);
        if corrupted {
            break;
        }
    }
    replies
}
