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

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::assert::ensure_fully_consumed;
use crate::codec::assert::insufficient_data;
use crate::error::Error;
use crate::hll::HyperLogLog;
use crate::hll::HyperLogLogBuilder;
use crate::window::Advance;
use crate::window::BucketInterval;
use crate::window::DEFAULT_NUM_BUCKETS;
use crate::window::HitOutcome;
use crate::window::advance;
use crate::window::live_slots;
use crate::window::slot;
use crate::window::slots_back;

/// A rolling estimate of distinct elements per time bucket, over the last `N`
/// buckets.
///
/// Each bucket owns an optional [`HyperLogLog`]; an absent bucket counts as zero and
/// a bucket is freed as soon as it leaves the window. The window total is the sum of
/// the per-bucket estimates, so an element seen in two live buckets is counted
/// twice. Use [`HyperLogLog::merge`] over [`WindowedUniqueEstimator::bucket`] for
/// union semantics.
///
/// Every bucket caches its estimate in the sketch header. A write refreshes the
/// cache of the bucket it touched when that bucket changed; reads only use cached
/// values.
///
/// ## Serialized layout
///
/// ```text
/// | last_bucket_time: i32 | created_time: i32 | interval: u32 | slot[0] | ... | slot[N-1] |
///
/// slot: | len: u32 | sketch bytes (len) |      len == 0 marks an empty slot
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedUniqueEstimator<const N: usize = DEFAULT_NUM_BUCKETS> {
    created_time: i64,
    interval: Option<BucketInterval>,
    last_bucket_time: i64,
    buckets: [Option<HyperLogLog>; N],
    sketch_builder: HyperLogLogBuilder,
}

impl<const N: usize> WindowedUniqueEstimator<N> {
    /// Creates an empty estimator stamped with `created_time`.
    pub fn new(created_time: i64) -> Self {
        Self::builder().created_time(created_time).build()
    }

    /// Creates a new builder for the estimator.
    pub fn builder() -> WindowedUniqueEstimatorBuilder<N> {
        WindowedUniqueEstimatorBuilder::default()
    }

    /// Adds one element to the bucket of `timestamp` and returns the window total.
    ///
    /// # Errors
    ///
    /// Fails with [`CorruptedSketch`](crate::error::ErrorKind::CorruptedSketch) if
    /// the target bucket holds a damaged sketch.
    pub fn hit(
        &mut self,
        interval: BucketInterval,
        element: &[u8],
        timestamp: i64,
    ) -> Result<HitOutcome, Error> {
        self.hit_with(interval, timestamp, |sketch| sketch.add(element))
    }

    /// Adds every NUL-delimited element of `elements` to the bucket of `timestamp`.
    ///
    /// Every piece between delimiters is added, empty ones included, so input without
    /// a NUL behaves like [`hit`](Self::hit). The bucket estimate is refreshed at
    /// most once.
    pub fn bulk_hit(
        &mut self,
        interval: BucketInterval,
        elements: &[u8],
        timestamp: i64,
    ) -> Result<HitOutcome, Error> {
        self.hit_with(interval, timestamp, |sketch| {
            let mut changed = false;
            for element in elements.split(|&b| b == 0) {
                changed |= sketch.add(element)?;
            }
            Ok(changed)
        })
    }

    fn hit_with<F>(
        &mut self,
        interval: BucketInterval,
        timestamp: i64,
        apply: F,
    ) -> Result<HitOutcome, Error>
    where
        F: FnOnce(&mut HyperLogLog) -> Result<bool, Error>,
    {
        let bucket_time = interval.bucket_time(timestamp);
        let target = slot(bucket_time, N);

        let reset = self.interval != Some(interval);
        if reset {
            if let Some(previous) = self.interval {
                tracing::debug!(
                    previous = previous.get(),
                    interval = interval.get(),
                    "bucket interval changed, resetting unique window"
                );
            }
            self.buckets = std::array::from_fn(|_| None);
            self.interval = Some(interval);
            self.last_bucket_time = bucket_time;
        }

        let rotated = match advance(bucket_time, self.last_bucket_time, N) {
            Advance::Rotate { cleared } => {
                tracing::trace!(cleared, bucket_time, "rotating unique window");
                for stale in slots_back(target, cleared, N) {
                    self.buckets[stale] = None;
                }
                self.last_bucket_time = bucket_time;
                true
            }
            Advance::InWindow => false,
            Advance::Expired => {
                return Ok(HitOutcome {
                    total: self.total(),
                    modified: false,
                });
            }
        };

        let created = self.buckets[target].is_none();
        let builder = &self.sketch_builder;
        let sketch = self.buckets[target].get_or_insert_with(|| builder.clone().build());
        let changed = apply(sketch).inspect_err(|err| warn_corrupted(err, target))?;
        let refreshed = changed || sketch.cached_cardinality().is_none();
        if refreshed {
            sketch
                .refresh_cached_cardinality()
                .inspect_err(|err| warn_corrupted(err, target))?;
        }

        Ok(HitOutcome {
            total: self.total(),
            modified: reset || rotated || created || refreshed,
        })
    }

    fn total(&self) -> i64 {
        self.buckets
            .iter()
            .flatten()
            .fold(0i64, |sum, sketch| sum.saturating_add(cached_estimate(sketch)))
    }

    /// Returns the sum of cached estimates of the buckets still live at `timestamp`,
    /// and the creation time.
    ///
    /// Nothing is recomputed: a bucket whose cache is stale contributes its last
    /// cached value.
    pub fn query(&self, timestamp: i64) -> (i64, i64) {
        let Some(interval) = self.interval else {
            return (0, self.created_time);
        };
        let bucket_time = interval.bucket_time(timestamp);
        let sum = live_slots(bucket_time, self.last_bucket_time, N)
            .filter_map(|s| self.buckets[s].as_ref())
            .fold(0i64, |sum, sketch| sum.saturating_add(cached_estimate(sketch)));
        (sum, self.created_time)
    }

    /// Returns the creation time.
    pub fn created_time(&self) -> i64 {
        self.created_time
    }

    /// Returns the bucket interval, or `None` if the estimator was never written.
    pub fn interval(&self) -> Option<BucketInterval> {
        self.interval
    }

    /// Returns the absolute bucket of the newest write.
    pub fn last_bucket_time(&self) -> i64 {
        self.last_bucket_time
    }

    /// Returns the sketch held in `slot`, if any.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= N`.
    pub fn bucket(&self, slot: usize) -> Option<&HyperLogLog> {
        self.buckets[slot].as_ref()
    }

    /// Returns the number of buckets in the window.
    pub fn num_buckets(&self) -> usize {
        N
    }

    /// Serializes this estimator into a byte vector.
    ///
    /// # Errors
    ///
    /// Fails with [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if
    /// the last bucket time or the creation time does not fit in 32 bits.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let last_bucket_time = to_i32(self.last_bucket_time, "last_bucket_time")?;
        let created_time = to_i32(self.created_time, "created_time")?;

        let payload: usize = self.buckets.iter().flatten().map(|s| s.as_bytes().len()).sum();
        let mut bytes = SketchBytes::with_capacity(12 + 4 * N + payload);
        bytes.write_i32_le(last_bucket_time);
        bytes.write_i32_le(created_time);
        bytes.write_u32_le(self.interval.map_or(0, BucketInterval::get));
        for bucket in &self.buckets {
            match bucket {
                None => bytes.write_u32_le(0),
                Some(sketch) => {
                    let sketch = sketch.as_bytes();
                    let len = u32::try_from(sketch.len()).map_err(|_| {
                        Error::invalid_argument("sketch too large to serialize")
                            .with_context("len", sketch.len())
                    })?;
                    bytes.write_u32_le(len);
                    bytes.write(sketch);
                }
            }
        }
        Ok(bytes.into_bytes())
    }

    /// Deserializes an estimator from bytes with the default sketch configuration.
    ///
    /// Slot sketches are wrapped without full validation; a damaged sketch surfaces
    /// as [`CorruptedSketch`](crate::error::ErrorKind::CorruptedSketch) on the next
    /// write to its bucket. Use [`WindowedUniqueEstimatorBuilder::deserialize`] to
    /// restore an estimator built with a non-default `sparse_max_bytes`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::builder().deserialize(bytes)
    }

    fn deserialize_with(bytes: &[u8], sketch_builder: HyperLogLogBuilder) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let last_bucket_time = cursor
            .read_i32_le()
            .map_err(insufficient_data("last_bucket_time"))?;
        let created_time = cursor
            .read_i32_le()
            .map_err(insufficient_data("created_time"))?;
        let interval = cursor
            .read_u32_le()
            .map_err(insufficient_data("interval"))?;

        let mut buckets: [Option<HyperLogLog>; N] = std::array::from_fn(|_| None);
        for (index, bucket) in buckets.iter_mut().enumerate() {
            let len = cursor
                .read_u32_le()
                .map_err(insufficient_data("slot_length"))?;
            if len == 0 {
                continue;
            }
            let sketch = cursor
                .read_exact(len as usize)
                .map_err(insufficient_data("slot_sketch"))?;
            let sketch = sketch_builder
                .wrap(sketch.to_vec())
                .map_err(|err| err.with_context("slot", index))?;
            *bucket = Some(sketch);
        }
        ensure_fully_consumed(&cursor, "windowed unique estimator")?;

        Ok(Self {
            created_time: created_time as i64,
            interval: BucketInterval::from_word(interval),
            last_bucket_time: last_bucket_time as i64,
            buckets,
            sketch_builder,
        })
    }
}

fn cached_estimate(sketch: &HyperLogLog) -> i64 {
    // The flag bit is masked, so the value always fits.
    sketch.last_cardinality() as i64
}

fn warn_corrupted(err: &Error, slot: usize) {
    tracing::warn!(slot, error = %err, "corrupted sketch in unique window");
}

fn to_i32(value: i64, field: &'static str) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| {
        Error::invalid_argument(format!("{field} does not fit in 32 bits"))
            .with_context("value", value)
    })
}

/// Builder for [`WindowedUniqueEstimator`].
#[derive(Debug, Clone, Default)]
pub struct WindowedUniqueEstimatorBuilder<const N: usize = DEFAULT_NUM_BUCKETS> {
    created_time: i64,
    sketch_builder: HyperLogLogBuilder,
}

impl<const N: usize> WindowedUniqueEstimatorBuilder<N> {
    /// Set the creation time reported by queries.
    pub fn created_time(mut self, created_time: i64) -> Self {
        self.created_time = created_time;
        self
    }

    /// Set the sparse size limit of the per-bucket sketches.
    ///
    /// See [`HyperLogLogBuilder::sparse_max_bytes`].
    pub fn sparse_max_bytes(mut self, sparse_max_bytes: usize) -> Self {
        self.sketch_builder = self.sketch_builder.sparse_max_bytes(sparse_max_bytes);
        self
    }

    /// Deserializes an estimator whose sketches use this builder's configuration.
    ///
    /// The creation time comes from the record, not from
    /// [`created_time`](Self::created_time).
    pub fn deserialize(self, bytes: &[u8]) -> Result<WindowedUniqueEstimator<N>, Error> {
        WindowedUniqueEstimator::deserialize_with(bytes, self.sketch_builder)
    }

    /// Build the estimator.
    pub fn build(self) -> WindowedUniqueEstimator<N> {
        const { assert!(N > 0, "a window needs at least one bucket") };
        WindowedUniqueEstimator {
            created_time: self.created_time,
            interval: None,
            last_bucket_time: 0,
            buckets: std::array::from_fn(|_| None),
            sketch_builder: self.sketch_builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn interval(n: i64) -> BucketInterval {
        BucketInterval::new(n).unwrap()
    }

    #[test]
    fn test_duplicate_in_same_bucket_adds_nothing() {
        let mut estimator = WindowedUniqueEstimator::<32>::new(0);
        let first = estimator.hit(interval(3600), b"alice", 0).unwrap();
        let second = estimator.hit(interval(3600), b"alice", 0).unwrap();
        assert_eq!(first.total, 1);
        assert_eq!(second.total, first.total);
        assert_eq!(estimator.query(0), (1, 0));
    }

    #[test]
    fn test_same_element_in_two_buckets_is_counted_twice() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        estimator.hit(interval(10), b"alice", 0).unwrap();
        let outcome = estimator.hit(interval(10), b"alice", 10).unwrap();
        assert_eq!(outcome.total, 2);
    }

    #[test]
    fn test_rotation_frees_stale_sketches() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        let i = interval(1);
        for t in 0..4 {
            estimator.hit(i, b"x", t).unwrap();
        }
        assert!((0..4).all(|s| estimator.bucket(s).is_some()));

        // Bucket 6 evicts buckets 0 through 2; buckets 4 and 5 stay empty.
        let outcome = estimator.hit(i, b"y", 6).unwrap();
        assert!(estimator.bucket(0).is_none());
        assert!(estimator.bucket(1).is_none());
        assert!(estimator.bucket(2).is_some());
        assert!(estimator.bucket(3).is_some());
        assert_eq!(outcome.total, 2);
        assert_eq!(estimator.query(6).0, 2);
        assert_eq!(estimator.query(9).0, 1);
        assert_eq!(estimator.query(10).0, 0);
    }

    #[test]
    fn test_expired_write_is_ignored() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        estimator.hit(interval(1), b"x", 10).unwrap();
        let before = estimator.clone();
        let outcome = estimator.hit(interval(1), b"y", 2).unwrap();
        assert!(!outcome.modified);
        assert_eq!(outcome.total, 1);
        assert_eq!(estimator, before);
    }

    #[test]
    fn test_interval_change_frees_all_buckets() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(7);
        estimator.hit(interval(10), b"a", 0).unwrap();
        estimator.hit(interval(10), b"b", 10).unwrap();
        let outcome = estimator.hit(interval(5), b"c", 0).unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(estimator.created_time(), 7);
        assert_eq!(estimator.interval(), Some(interval(5)));
    }

    #[test]
    fn test_bulk_hit_counts_empty_elements() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        let outcome = estimator
            .bulk_hit(interval(60), b"alice\0bob\0\0carol", 0)
            .unwrap();
        assert_eq!(outcome.total, 4);
        let sketch = estimator.bucket(0).unwrap();
        assert_eq!(sketch.cached_cardinality(), Some(4));
    }

    #[test]
    fn test_bulk_hit_without_delimiter_matches_hit() {
        for element in [&b""[..], b"alice"] {
            let mut single = WindowedUniqueEstimator::<4>::new(0);
            let mut bulk = WindowedUniqueEstimator::<4>::new(0);
            let expected = single.hit(interval(60), element, 0).unwrap();
            let outcome = bulk.bulk_hit(interval(60), element, 0).unwrap();
            assert_eq!(outcome, expected);
            assert_eq!(outcome.total, 1);
            assert_eq!(bulk, single);
        }
    }

    #[test]
    fn test_unchanged_bucket_is_not_modified() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        assert!(estimator.hit(interval(60), b"alice", 0).unwrap().modified);
        let before = estimator.clone();
        let outcome = estimator.hit(interval(60), b"alice", 30).unwrap();
        assert_eq!(outcome.total, 1);
        assert!(!outcome.modified);
        assert_eq!(estimator, before);

        // A new bucket or a new element is a change.
        assert!(estimator.hit(interval(60), b"alice", 60).unwrap().modified);
        assert!(estimator.hit(interval(60), b"bob", 60).unwrap().modified);
    }

    #[test]
    fn test_query_uses_cached_estimate() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        estimator.hit(interval(60), b"alice", 0).unwrap();
        let mut bytes = estimator.serialize().unwrap();
        // Mark the cache of slot 0 stale; the last value is still reported.
        let flag = 12 + 4 + 15;
        bytes[flag] |= 0x80;
        let restored = WindowedUniqueEstimator::<4>::deserialize(&bytes).unwrap();
        assert_eq!(restored.bucket(0).unwrap().cached_cardinality(), None);
        assert_eq!(restored.query(0), (1, 0));
    }

    #[test]
    fn test_corrupted_bucket_fails_hit() {
        let mut estimator = WindowedUniqueEstimator::<4>::new(0);
        estimator.hit(interval(60), b"alice", 0).unwrap();
        let mut bytes = estimator.serialize().unwrap();
        bytes[12 + 4] = b'X';
        let mut restored = WindowedUniqueEstimator::<4>::deserialize(&bytes).unwrap();
        let err = restored.hit(interval(60), b"bob", 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedSketch);
        // Other buckets remain writable.
        assert_eq!(restored.hit(interval(60), b"bob", 60).unwrap().total, 2);
    }

    #[test]
    fn test_builder_deserialize_keeps_sketch_config() {
        let builder = WindowedUniqueEstimator::<4>::builder().sparse_max_bytes(0);
        let mut estimator = builder.clone().build();
        estimator.hit(interval(60), b"alice", 0).unwrap();
        let bytes = estimator.serialize().unwrap();

        let mut restored = builder.deserialize(&bytes).unwrap();
        assert_eq!(restored, estimator);
        estimator.hit(interval(60), b"bob", 60).unwrap();
        restored.hit(interval(60), b"bob", 60).unwrap();
        assert!(!restored.bucket(1).unwrap().is_sparse());
        assert_eq!(restored, estimator);

        // The default configuration keeps the new bucket sparse.
        let mut plain = WindowedUniqueEstimator::<4>::deserialize(&bytes).unwrap();
        plain.hit(interval(60), b"bob", 60).unwrap();
        assert!(plain.bucket(1).unwrap().is_sparse());
    }

    #[test]
    fn test_serialize_rejects_wide_times() {
        let estimator = WindowedUniqueEstimator::<4>::new(i64::from(i32::MAX) + 1);
        let err = estimator.serialize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_record_layout() {
        let mut estimator = WindowedUniqueEstimator::<2>::new(-3);
        estimator.hit(interval(10), b"alice", 15).unwrap();
        let bytes = estimator.serialize().unwrap();
        let sketch = estimator.bucket(1).unwrap().as_bytes();

        assert_eq!(&bytes[..12], &[1u8, 0, 0, 0, 0xfd, 0xff, 0xff, 0xff, 10, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0u8; 4]);
        assert_eq!(&bytes[16..20], &(sketch.len() as u32).to_le_bytes());
        assert_eq!(&bytes[20..], sketch);

        let restored = WindowedUniqueEstimator::<2>::deserialize(&bytes).unwrap();
        assert_eq!(restored.query(15), estimator.query(15));
        assert_eq!(restored.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_record() {
        let mut estimator = WindowedUniqueEstimator::<2>::new(0);
        estimator.hit(interval(10), b"alice", 0).unwrap();
        let bytes = estimator.serialize().unwrap();
        let err = WindowedUniqueEstimator::<2>::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
