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

//! Rolling windows of fixed-width time buckets.
//!
//! A window is a ring of `N` buckets. A timestamp `t` falls in the absolute bucket
//! `floor(t / interval)`, stored in slot `floor_mod(bucket, N)`. The window remembers
//! the absolute bucket of its most recent write; any bucket more than `N - 1`
//! buckets older than that is stale and counts as zero.
//!
//! Stale buckets are cleared lazily, by the next write that moves time forward:
//!
//! ```text
//!  last write at bucket 10, N = 4        write at bucket 12
//!  slot   0    1    2    3               slot   0    1    2    3
//!       +----+----+----+----+                 +----+----+----+----+
//!       |  8 |  9 | 10 |  7 |                 | 12 |  9 | 10 |  - |
//!       +----+----+----+----+                 +----+----+----+----+
//! ```
//!
//! Buckets 7 and 8 drop out; slot 3 is cleared for the empty bucket 11.
//!
//! The counters themselves are [`WindowedCounter`] (sums of amounts) and
//! [`WindowedUniqueEstimator`] (sums of per-bucket distinct-count estimates).
//!
//! # Usage
//!
//! ```rust
//! # use timewindow::window::BucketInterval;
//! # use timewindow::window::WindowedCounter;
//! let interval = BucketInterval::new(60).unwrap();
//! let mut counter = WindowedCounter::<32>::new();
//! counter.hit(interval, 5, 0);
//! counter.hit(interval, 3, 30);
//! assert_eq!(counter.hit(interval, 2, 600).total, 10);
//! assert_eq!(counter.query(600), 10);
//! // 32 buckets later the first bucket has left the window.
//! assert_eq!(counter.query(60 * 32), 2);
//! ```

mod counter;
mod unique;

pub use self::counter::WindowedCounter;
pub use self::unique::WindowedUniqueEstimator;
pub use self::unique::WindowedUniqueEstimatorBuilder;

use crate::error::Error;

/// Default number of buckets in a window.
pub const DEFAULT_NUM_BUCKETS: usize = 32;

/// Width of one bucket, in the caller's time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketInterval(u32);

impl BucketInterval {
    /// Creates an interval.
    ///
    /// Fails with [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// unless `interval` is in `1..=u32::MAX`.
    pub fn new(interval: i64) -> Result<Self, Error> {
        match u32::try_from(interval) {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(Error::invalid_argument(format!(
                "bucket interval must be in 1..={}, got {interval}",
                u32::MAX
            ))),
        }
    }

    /// Returns the interval as an integer.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the absolute bucket holding `timestamp`, rounding toward negative
    /// infinity.
    pub fn bucket_time(self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.0 as i64)
    }

    /// Decodes the interval word of a serialized window; zero means unset.
    pub(crate) fn from_word(word: u32) -> Option<Self> {
        (word != 0).then_some(Self(word))
    }
}

/// Result of a write into a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    /// Sum over every live bucket after the write.
    pub total: i64,
    /// Whether the window changed. Always false when the timestamp was older than
    /// the whole window.
    pub modified: bool,
}

/// Slot of an absolute bucket: floor modulo `n`, always in `0..n`.
///
/// Every slot index in this module is derived here.
#[inline]
pub(crate) fn slot(bucket_time: i64, n: usize) -> usize {
    bucket_time.rem_euclid(n as i64) as usize
}

/// How a write at some bucket relates to the last written bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Time moved forward: `cleared` slots, walking back from the target slot, hold
    /// stale data.
    Rotate { cleared: usize },
    /// The target bucket is still live: the newest one, or a late write.
    InWindow,
    /// The target bucket is older than the whole window.
    Expired,
}

pub(crate) fn advance(bucket_time: i64, last_bucket_time: i64, n: usize) -> Advance {
    let diff = bucket_time.saturating_sub(last_bucket_time);
    let n = n as i64;
    if diff > 0 {
        Advance::Rotate {
            cleared: diff.min(n) as usize,
        }
    } else if diff > -n {
        Advance::InWindow
    } else {
        Advance::Expired
    }
}

/// The `count` slots ending at `from`, walking backward around the ring.
pub(crate) fn slots_back(from: usize, count: usize, n: usize) -> impl Iterator<Item = usize> {
    (0..count.min(n)).map(move |k| (from + n - k) % n)
}

/// Slots still live when the window, last written at `last_bucket_time`, is read at
/// `bucket_time`. Reading never moves the window.
pub(crate) fn live_slots(
    bucket_time: i64,
    last_bucket_time: i64,
    n: usize,
) -> impl Iterator<Item = usize> {
    let diff = bucket_time.saturating_sub(last_bucket_time);
    let live = if diff >= n as i64 {
        0
    } else {
        n - diff.max(0) as usize
    };
    slots_back(slot(last_bucket_time, n), live, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_interval_range() {
        assert_eq!(BucketInterval::new(1).unwrap().get(), 1);
        assert_eq!(
            BucketInterval::new(u32::MAX as i64).unwrap().get(),
            u32::MAX
        );
        for bad in [0, -1, i64::MIN, u32::MAX as i64 + 1] {
            let err = BucketInterval::new(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_bucket_time_floors_negative_timestamps() {
        let interval = BucketInterval::new(60).unwrap();
        assert_eq!(interval.bucket_time(0), 0);
        assert_eq!(interval.bucket_time(59), 0);
        assert_eq!(interval.bucket_time(60), 1);
        assert_eq!(interval.bucket_time(-1), -1);
        assert_eq!(interval.bucket_time(-60), -1);
        assert_eq!(interval.bucket_time(-61), -2);
    }

    #[test]
    fn test_slot_is_floor_modulo() {
        assert_eq!(slot(0, 4), 0);
        assert_eq!(slot(5, 4), 1);
        assert_eq!(slot(-1, 4), 3);
        assert_eq!(slot(-4, 4), 0);
        assert_eq!(slot(-5, 4), 3);
        assert_eq!(slot(i64::MIN, 32), 0);
    }

    #[test]
    fn test_advance() {
        assert_eq!(advance(10, 10, 4), Advance::InWindow);
        assert_eq!(advance(7, 10, 4), Advance::InWindow);
        assert_eq!(advance(6, 10, 4), Advance::Expired);
        assert_eq!(advance(11, 10, 4), Advance::Rotate { cleared: 1 });
        assert_eq!(advance(100, 10, 4), Advance::Rotate { cleared: 4 });
        assert_eq!(advance(i64::MAX, i64::MIN, 4), Advance::Rotate { cleared: 4 });
        assert_eq!(advance(i64::MIN, i64::MAX, 4), Advance::Expired);
    }

    #[test]
    fn test_slots_back_wraps() {
        assert_eq!(slots_back(1, 3, 4).collect::<Vec<_>>(), vec![1, 0, 3]);
        assert_eq!(slots_back(2, 10, 4).collect::<Vec<_>>(), vec![2, 1, 0, 3]);
        assert_eq!(slots_back(2, 0, 4).count(), 0);
    }

    #[test]
    fn test_live_slots() {
        // Last write at bucket 10 (slot 2 of 4).
        assert_eq!(live_slots(10, 10, 4).collect::<Vec<_>>(), vec![2, 1, 0, 3]);
        assert_eq!(live_slots(5, 10, 4).count(), 4);
        assert_eq!(live_slots(12, 10, 4).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(live_slots(14, 10, 4).count(), 0);
        assert_eq!(live_slots(i64::MAX, -10, 4).count(), 0);
    }
}
