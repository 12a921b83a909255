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
use crate::window::Advance;
use crate::window::BucketInterval;
use crate::window::DEFAULT_NUM_BUCKETS;
use crate::window::HitOutcome;
use crate::window::advance;
use crate::window::live_slots;
use crate::window::slot;
use crate::window::slots_back;

/// A rolling sum of amounts over the last `N` time buckets.
///
/// Buckets are `u32` counters; additions saturate. Changing the bucket interval
/// discards the whole history.
///
/// ## Serialized layout
///
/// ```text
/// | interval: u32 | last_bucket_time: i64 | bucket[0]: u32 | ... | bucket[N-1]: u32 |
/// ```
///
/// All fields are little-endian. An interval of zero marks a window never written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowedCounter<const N: usize = DEFAULT_NUM_BUCKETS> {
    interval: Option<BucketInterval>,
    last_bucket_time: i64,
    buckets: [u32; N],
}

impl<const N: usize> Default for WindowedCounter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> WindowedCounter<N> {
    const RECORD_SIZE: usize = 4 + 8 + 4 * N;

    /// Creates an empty counter.
    pub fn new() -> Self {
        const { assert!(N > 0, "a window needs at least one bucket") };
        Self {
            interval: None,
            last_bucket_time: 0,
            buckets: [0; N],
        }
    }

    /// Adds `amount` to the bucket of `timestamp` and returns the window sum.
    ///
    /// A timestamp more than `N - 1` buckets older than the newest write is
    /// ignored; the outcome then reports `modified == false`.
    pub fn hit(&mut self, interval: BucketInterval, amount: u32, timestamp: i64) -> HitOutcome {
        let bucket_time = interval.bucket_time(timestamp);
        let target = slot(bucket_time, N);

        if self.interval != Some(interval) {
            if let Some(previous) = self.interval {
                tracing::debug!(
                    previous = previous.get(),
                    interval = interval.get(),
                    "bucket interval changed, resetting counter window"
                );
            }
            self.buckets = [0; N];
            self.interval = Some(interval);
            self.last_bucket_time = bucket_time;
        }

        let modified = match advance(bucket_time, self.last_bucket_time, N) {
            Advance::Rotate { cleared } => {
                tracing::trace!(cleared, bucket_time, "rotating counter window");
                for stale in slots_back(target, cleared, N) {
                    self.buckets[stale] = 0;
                }
                self.buckets[target] = amount;
                self.last_bucket_time = bucket_time;
                true
            }
            Advance::InWindow => {
                self.buckets[target] = self.buckets[target].saturating_add(amount);
                true
            }
            Advance::Expired => false,
        };

        HitOutcome {
            total: self.buckets.iter().map(|&b| b as i64).sum(),
            modified,
        }
    }

    /// Returns the sum of the buckets still live at `timestamp`, without moving the
    /// window.
    pub fn query(&self, timestamp: i64) -> i64 {
        let Some(interval) = self.interval else {
            return 0;
        };
        let bucket_time = interval.bucket_time(timestamp);
        live_slots(bucket_time, self.last_bucket_time, N)
            .map(|s| self.buckets[s] as i64)
            .sum()
    }

    /// Returns the bucket interval, or `None` if the counter was never written.
    pub fn interval(&self) -> Option<BucketInterval> {
        self.interval
    }

    /// Returns the absolute bucket of the newest write.
    pub fn last_bucket_time(&self) -> i64 {
        self.last_bucket_time
    }

    /// Returns the raw bucket array, indexed by slot.
    pub fn buckets(&self) -> &[u32; N] {
        &self.buckets
    }

    /// Returns the number of buckets in the window.
    pub fn num_buckets(&self) -> usize {
        N
    }

    /// Serializes this counter into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(Self::RECORD_SIZE);
        bytes.write_u32_le(self.interval.map_or(0, BucketInterval::get));
        bytes.write_i64_le(self.last_bucket_time);
        for &bucket in &self.buckets {
            bytes.write_u32_le(bucket);
        }
        bytes.into_bytes()
    }

    /// Deserializes a counter from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let interval = cursor
            .read_u32_le()
            .map_err(insufficient_data("interval"))?;
        let last_bucket_time = cursor
            .read_i64_le()
            .map_err(insufficient_data("last_bucket_time"))?;
        let mut buckets = [0u32; N];
        for bucket in &mut buckets {
            *bucket = cursor.read_u32_le().map_err(insufficient_data("buckets"))?;
        }
        ensure_fully_consumed(&cursor, "windowed counter")?;

        Ok(Self {
            interval: BucketInterval::from_word(interval),
            last_bucket_time,
            buckets,
        })
    }
}
