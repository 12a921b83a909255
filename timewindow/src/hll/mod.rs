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

//! HyperLogLog sketch for approximate distinct counting.
//!
//! A sketch summarizes a multiset of byte strings in `2^14` six-bit registers and
//! estimates how many distinct strings it has seen, with a standard error of about
//! 0.81%.
//!
//! The sketch is stored as one contiguous buffer in the Redis-compatible layout:
//!
//! ```text
//! +------+---+-----+------------+--------------------+
//! | HYLL | E | N/U | Cardinality| registers ...      |
//! +------+---+-----+------------+--------------------+
//!   4B    1B   3B       8B
//! ```
//!
//! `E` is the [`Encoding`] tag. The cardinality is a little-endian cache of the
//! last computed estimate; its most significant bit is set while the cache is
//! stale. Dense registers are packed six bits each, least significant bit first.
//! Sparse payloads are run-length opcode streams used while most registers are
//! still zero.
//!
//! # Usage
//!
//! ```rust
//! # use timewindow::hll::HyperLogLog;
//! let mut sketch = HyperLogLog::new();
//! assert!(sketch.add(b"alice").unwrap());
//! assert!(!sketch.add(b"alice").unwrap());
//! sketch.add(b"bob").unwrap();
//! assert_eq!(sketch.count().unwrap(), 2);
//! ```
//!
//! # Cache management
//!
//! [`HyperLogLog::count`] never touches the cached cardinality. When
//! [`HyperLogLog::add`] returns `true` the cache is marked stale and the caller decides
//! when to recompute it:
//!
//! ```rust
//! # use timewindow::hll::HyperLogLog;
//! let mut sketch = HyperLogLog::new();
//! sketch.add(b"alice").unwrap();
//! assert_eq!(sketch.cached_cardinality(), None);
//! let estimate = sketch.refresh_cached_cardinality().unwrap();
//! assert_eq!(sketch.cached_cardinality(), Some(estimate));
//! ```

mod dense;
mod estimator;
mod serialization;
mod sketch;
mod sparse;

pub use self::serialization::HLL_HEADER_SIZE;
pub use self::serialization::HLL_MAGIC;
pub use self::sketch::HyperLogLog;
pub use self::sketch::HyperLogLogBuilder;

use crate::hash::DEFAULT_HASH_SEED;
use crate::hash::murmur_hash64a;

/// Number of hash bits used to select a register.
pub const HLL_P: u32 = 14;
/// Number of registers.
pub const HLL_REGISTERS: usize = 1 << HLL_P;
/// Bits per register.
pub const HLL_BITS: usize = 6;
/// Largest value a register can hold.
pub const HLL_REGISTER_MAX: u8 = (1 << HLL_BITS) - 1;
/// Size in bytes of a dense register payload.
pub const HLL_DENSE_SIZE: usize = (HLL_REGISTERS * HLL_BITS).div_ceil(8);
/// Default upper bound on a sparse payload before promotion to dense.
pub const DEFAULT_SPARSE_MAX_BYTES: usize = 3000;

/// Register encoding of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One packed six-bit value per register.
    Dense,
    /// Run-length opcodes, for sketches with few non-zero registers.
    Sparse,
}

impl Encoding {
    /// Returns the header tag byte of this encoding.
    pub fn tag(self) -> u8 {
        match self {
            Encoding::Dense => 0,
            Encoding::Sparse => 1,
        }
    }

    /// Parses a header tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Encoding::Dense),
            1 => Some(Encoding::Sparse),
            _ => None,
        }
    }
}

/// Routes an element to its register and computes the candidate register value.
///
/// The top [`HLL_P`] bits of the hash select the register. The value is one plus the
/// number of leading zeros in the remaining bits. A sentinel bit bounds the run.
pub(crate) fn hash_element(element: &[u8]) -> (usize, u8) {
    let hash = murmur_hash64a(element, DEFAULT_HASH_SEED);
    let index = (hash >> (64 - HLL_P)) as usize;
    let rest = (hash << HLL_P) | (1 << (HLL_P - 1));
    let value = (rest.leading_zeros() as u8 + 1).min(HLL_REGISTER_MAX);
    (index, value)
}
