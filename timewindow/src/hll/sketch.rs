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

use std::fmt;

use crate::error::Error;
use crate::hll::DEFAULT_SPARSE_MAX_BYTES;
use crate::hll::Encoding;
use crate::hll::HLL_DENSE_SIZE;
use crate::hll::dense;
use crate::hll::estimator;
use crate::hll::hash_element;
use crate::hll::serialization::*;
use crate::hll::sparse;

/// A HyperLogLog sketch backed by its serialized buffer.
///
/// The buffer is the sketch: header, cached cardinality and registers live in one
/// `Vec<u8>`, so [`HyperLogLog::as_bytes`] is free and a buffer handed over by a
/// storage host can be wrapped without copying through
/// [`HyperLogLog::from_raw_bytes`].
///
/// See [`crate::hll`] for the layout.
#[derive(Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    bytes: Vec<u8>,
    sparse_max_bytes: usize,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HyperLogLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperLogLog")
            .field("encoding", &self.encoding().ok())
            .field("len", &self.bytes.len())
            .field("cached_cardinality", &self.cached_cardinality())
            .finish()
    }
}

impl HyperLogLog {
    /// Creates an empty sketch with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a new builder for HyperLogLog.
    pub fn builder() -> HyperLogLogBuilder {
        HyperLogLogBuilder::default()
    }

    /// Wraps a serialized sketch without validating it.
    ///
    /// Only the header length is checked. A buffer with a damaged magic tag,
    /// encoding tag or payload is accepted here and reported as
    /// [`CorruptedSketch`](crate::error::ErrorKind::CorruptedSketch) by
    /// [`HyperLogLog::count`] and [`HyperLogLog::add`]. Use
    /// [`HyperLogLog::deserialize`] to reject such input up front.
    pub fn from_raw_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        Self::builder().wrap(bytes)
    }

    /// Deserializes and fully validates a sketch.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let sketch = Self::from_raw_bytes(bytes.to_vec())?;
        sketch.validate()?;
        Ok(sketch)
    }

    /// Serializes this sketch into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Returns the serialized form of this sketch.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the register encoding, or an error if the header is damaged.
    pub fn encoding(&self) -> Result<Encoding, Error> {
        if self.bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4] != HLL_MAGIC {
            return Err(Error::corrupted("bad magic tag")
                .with_context("magic", format!("{:02x?}", &self.bytes[..4])));
        }
        let tag = self.bytes[ENCODING_BYTE];
        Encoding::from_tag(tag)
            .ok_or_else(|| Error::corrupted("unknown encoding").with_context("tag", tag))
    }

    /// Returns true if the sketch uses the sparse encoding.
    pub fn is_sparse(&self) -> bool {
        matches!(self.encoding(), Ok(Encoding::Sparse))
    }

    /// Checks the header and the whole register payload.
    pub fn validate(&self) -> Result<(), Error> {
        match self.encoding()? {
            Encoding::Dense => self.dense_payload().map(|_| ()),
            Encoding::Sparse => {
                for run in sparse::Runs::new(self.payload()) {
                    run?;
                }
                Ok(())
            }
        }
    }

    /// Adds an element.
    ///
    /// Returns `true` iff a register grew, in which case the cached cardinality is
    /// marked stale. The estimate is not recomputed.
    ///
    /// Any byte string is a valid element. Fails only if the sketch itself is
    /// corrupted.
    pub fn add(&mut self, element: &[u8]) -> Result<bool, Error> {
        let (index, value) = hash_element(element);
        let changed = self.raise(index, value)?;
        if changed {
            self.invalidate_cache();
        }
        Ok(changed)
    }

    /// Computes the cardinality estimate from the registers.
    ///
    /// The cached cardinality is neither consulted nor updated.
    pub fn count(&self) -> Result<u64, Error> {
        let mut histogram = [0u32; 64];
        match self.encoding()? {
            Encoding::Dense => dense::histogram(self.dense_payload()?, &mut histogram),
            Encoding::Sparse => sparse::histogram(self.payload(), &mut histogram)?,
        }
        Ok(estimator::estimate(&histogram))
    }

    /// Returns the cached cardinality if it is valid.
    pub fn cached_cardinality(&self) -> Option<u64> {
        let card = read_card(&self.bytes);
        (card & CACHE_INVALID_FLAG == 0).then_some(card)
    }

    /// Returns the last cached cardinality, whether or not it is still valid.
    pub fn last_cardinality(&self) -> u64 {
        read_card(&self.bytes) & !CACHE_INVALID_FLAG
    }

    /// Stores `card` as the valid cached cardinality.
    pub fn set_cached_cardinality(&mut self, card: u64) {
        write_card(&mut self.bytes, card & !CACHE_INVALID_FLAG);
    }

    /// Marks the cached cardinality stale, keeping its last value.
    pub fn invalidate_cache(&mut self) {
        let card = read_card(&self.bytes);
        write_card(&mut self.bytes, card | CACHE_INVALID_FLAG);
    }

    /// Recomputes the estimate and stores it as the cached cardinality.
    pub fn refresh_cached_cardinality(&mut self) -> Result<u64, Error> {
        let card = self.count()?;
        self.set_cached_cardinality(card);
        Ok(card)
    }

    /// Decodes the register array, one byte per register.
    pub fn registers(&self) -> Result<Vec<u8>, Error> {
        match self.encoding()? {
            Encoding::Dense => Ok(dense::decode(self.dense_payload()?)),
            Encoding::Sparse => sparse::decode(self.payload()),
        }
    }

    /// Merges `other` into this sketch by taking the register-wise maximum.
    ///
    /// The result estimates the cardinality of the union of both inputs. Returns
    /// whether any register of `self` grew.
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<bool, Error> {
        let incoming = other.registers()?;
        let changed = match self.encoding()? {
            Encoding::Dense => {
                let payload = self.dense_payload_mut()?;
                let mut changed = false;
                for (index, &value) in incoming.iter().enumerate() {
                    changed |= dense::update(payload, index, value);
                }
                changed
            }
            Encoding::Sparse => {
                let mut registers = sparse::decode(self.payload())?;
                let mut changed = false;
                for (mine, &theirs) in registers.iter_mut().zip(&incoming) {
                    if theirs > *mine {
                        *mine = theirs;
                        changed = true;
                    }
                }
                if changed {
                    self.store_registers(&registers);
                }
                changed
            }
        };
        if changed {
            self.invalidate_cache();
        }
        Ok(changed)
    }

    /// Converts a sparse sketch to the dense encoding. No-op if already dense.
    pub fn promote_to_dense(&mut self) -> Result<(), Error> {
        if self.encoding()? == Encoding::Sparse {
            let registers = sparse::decode(self.payload())?;
            self.write_payload(Encoding::Dense, &dense::encode(&registers));
        }
        Ok(())
    }

    fn raise(&mut self, index: usize, value: u8) -> Result<bool, Error> {
        match self.encoding()? {
            Encoding::Dense => Ok(dense::update(self.dense_payload_mut()?, index, value)),
            Encoding::Sparse => {
                if sparse::get(self.payload(), index)? >= value {
                    return Ok(false);
                }
                let mut registers = sparse::decode(self.payload())?;
                registers[index] = value;
                self.store_registers(&registers);
                Ok(true)
            }
        }
    }

    /// Stores the registers of a sparse sketch, promoting it to dense when a value
    /// does not fit an opcode or the stream grows past `sparse_max_bytes`.
    fn store_registers(&mut self, registers: &[u8]) {
        match sparse::encode(registers) {
            Some(payload) if payload.len() <= self.sparse_max_bytes => {
                self.write_payload(Encoding::Sparse, &payload);
            }
            _ => {
                tracing::trace!(
                    sparse_max_bytes = self.sparse_max_bytes,
                    "promoting sketch to dense encoding"
                );
                self.write_payload(Encoding::Dense, &dense::encode(registers));
            }
        }
    }

    fn write_payload(&mut self, encoding: Encoding, payload: &[u8]) {
        self.bytes.truncate(HLL_HEADER_SIZE);
        self.bytes.extend_from_slice(payload);
        self.bytes[ENCODING_BYTE] = encoding.tag();
    }

    fn payload(&self) -> &[u8] {
        &self.bytes[HLL_HEADER_SIZE..]
    }

    fn dense_payload(&self) -> Result<&[u8], Error> {
        let payload = self.payload();
        if payload.len() != HLL_DENSE_SIZE {
            return Err(dense_size_mismatch(payload.len()));
        }
        Ok(payload)
    }

    fn dense_payload_mut(&mut self) -> Result<&mut [u8], Error> {
        let payload = &mut self.bytes[HLL_HEADER_SIZE..];
        if payload.len() != HLL_DENSE_SIZE {
            return Err(dense_size_mismatch(payload.len()));
        }
        Ok(payload)
    }
}

fn dense_size_mismatch(actual: usize) -> Error {
    Error::corrupted(format!(
        "dense payload must be {HLL_DENSE_SIZE} bytes, got {actual}"
    ))
}

/// Builder for [`HyperLogLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLogBuilder {
    sparse_max_bytes: usize,
    dense: bool,
}

impl Default for HyperLogLogBuilder {
    fn default() -> Self {
        Self {
            sparse_max_bytes: DEFAULT_SPARSE_MAX_BYTES,
            dense: false,
        }
    }
}

impl HyperLogLogBuilder {
    /// Set the largest sparse payload, in bytes, kept before promotion to dense.
    ///
    /// Zero makes the first register update promote the sketch.
    pub fn sparse_max_bytes(mut self, sparse_max_bytes: usize) -> Self {
        self.sparse_max_bytes = sparse_max_bytes;
        self
    }

    /// Start in the dense encoding instead of the sparse one.
    pub fn dense(mut self, dense: bool) -> Self {
        self.dense = dense;
        self
    }

    /// Wrap a serialized sketch with this configuration.
    ///
    /// The encoding of `bytes` wins over [`dense`](Self::dense). See
    /// [`HyperLogLog::from_raw_bytes`].
    pub fn wrap(&self, bytes: Vec<u8>) -> Result<HyperLogLog, Error> {
        if bytes.len() < HLL_HEADER_SIZE {
            return Err(Error::corrupted(format!(
                "sketch of {} bytes is shorter than its {HLL_HEADER_SIZE} byte header",
                bytes.len()
            )));
        }
        Ok(HyperLogLog {
            bytes,
            sparse_max_bytes: self.sparse_max_bytes,
        })
    }

    /// Build the HyperLogLog.
    pub fn build(self) -> HyperLogLog {
        let (encoding, payload) = if self.dense {
            (Encoding::Dense, vec![0u8; HLL_DENSE_SIZE])
        } else {
            (Encoding::Sparse, sparse::empty())
        };
        let mut bytes = vec![0u8; HLL_HEADER_SIZE + payload.len()];
        write_header(&mut bytes, encoding.tag());
        bytes[HLL_HEADER_SIZE..].copy_from_slice(&payload);
        HyperLogLog {
            bytes,
            sparse_max_bytes: self.sparse_max_bytes,
        }
    }
}
