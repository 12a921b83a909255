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

//! Sparse register payload: a run-length opcode stream.
//!
//! ```text
//! ZERO:  00xxxxxx           (x+1) zero registers, 1..=64
//! XZERO: 01xxxxxx yyyyyyyy  (xy+1) zero registers, 1..=16384
//! VAL:   1vvvvvxx           (x+1) registers holding (v+1), value 1..=32, run 1..=4
//! ```
//!
//! A well-formed stream covers exactly [`HLL_REGISTERS`] registers.

use crate::error::Error;
use crate::hll::HLL_REGISTERS;

/// Largest register value a VAL opcode can carry.
pub(super) const SPARSE_VAL_MAX_VALUE: u8 = 32;
const SPARSE_VAL_MAX_LEN: usize = 4;
const SPARSE_ZERO_MAX_LEN: usize = 64;
const SPARSE_XZERO_MAX_LEN: usize = 16384;

#[inline]
fn is_zero(b: u8) -> bool {
    b & 0xc0 == 0x00
}

#[inline]
fn is_xzero(b: u8) -> bool {
    b & 0xc0 == 0x40
}

#[inline]
fn zero_len(b: u8) -> usize {
    (b & 0x3f) as usize + 1
}

#[inline]
fn xzero_len(b1: u8, b2: u8) -> usize {
    ((((b1 & 0x3f) as usize) << 8) | b2 as usize) + 1
}

#[inline]
fn val_value(b: u8) -> u8 {
    ((b >> 2) & 0x1f) + 1
}

#[inline]
fn val_len(b: u8) -> usize {
    (b & 0x03) as usize + 1
}

/// Iterator over `(value, run_length)` pairs of a sparse payload.
///
/// Yields an error, then stops, if the stream is truncated or does not cover
/// exactly [`HLL_REGISTERS`] registers.
pub(super) struct Runs<'a> {
    payload: &'a [u8],
    pos: usize,
    covered: usize,
    done: bool,
}

impl<'a> Runs<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            pos: 0,
            covered: 0,
            done: false,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<(u8, usize), Error>> {
        self.done = true;
        Some(Err(Error::corrupted(message).with_context("offset", self.pos)))
    }
}

impl Iterator for Runs<'_> {
    type Item = Result<(u8, usize), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(&b) = self.payload.get(self.pos) else {
            if self.covered == HLL_REGISTERS {
                self.done = true;
                return None;
            }
            let message = format!(
                "sparse payload covers {} of {HLL_REGISTERS} registers",
                self.covered
            );
            return self.fail(message);
        };

        let (value, len, width) = if is_zero(b) {
            (0, zero_len(b), 1)
        } else if is_xzero(b) {
            let Some(&b2) = self.payload.get(self.pos + 1) else {
                return self.fail("truncated XZERO opcode".to_string());
            };
            (0, xzero_len(b, b2), 2)
        } else {
            (val_value(b), val_len(b), 1)
        };

        if self.covered + len > HLL_REGISTERS {
            let message = format!("sparse payload overflows {HLL_REGISTERS} registers");
            return self.fail(message);
        }
        self.pos += width;
        self.covered += len;
        Some(Ok((value, len)))
    }
}

/// Returns the value of register `index`, reading only as far as needed.
pub(super) fn get(payload: &[u8], index: usize) -> Result<u8, Error> {
    let mut start = 0;
    for run in Runs::new(payload) {
        let (value, len) = run?;
        if index < start + len {
            return Ok(value);
        }
        start += len;
    }
    Err(Error::corrupted("register index past end of sparse payload"))
}

/// Adds the value of every register to `histogram`.
pub(super) fn histogram(payload: &[u8], histogram: &mut [u32; 64]) -> Result<(), Error> {
    for run in Runs::new(payload) {
        let (value, len) = run?;
        histogram[value as usize] += len as u32;
    }
    Ok(())
}

/// Unpacks all registers, one byte each.
pub(super) fn decode(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut registers = Vec::with_capacity(HLL_REGISTERS);
    for run in Runs::new(payload) {
        let (value, len) = run?;
        registers.resize(registers.len() + len, value);
    }
    Ok(registers)
}

/// Encodes one byte per register as an opcode stream.
///
/// Returns `None` if a register exceeds [`SPARSE_VAL_MAX_VALUE`].
pub(super) fn encode(registers: &[u8]) -> Option<Vec<u8>> {
    debug_assert_eq!(registers.len(), HLL_REGISTERS);
    let mut out = Vec::new();
    let mut i = 0;
    while i < registers.len() {
        let value = registers[i];
        let run = registers[i..].iter().take_while(|&&v| v == value).count();
        let mut left = run;
        if value == 0 {
            while left > 0 {
                if left > SPARSE_ZERO_MAX_LEN {
                    let len = left.min(SPARSE_XZERO_MAX_LEN);
                    let v = (len - 1) as u16;
                    out.push(0x40 | (v >> 8) as u8);
                    out.push((v & 0xff) as u8);
                    left -= len;
                } else {
                    out.push((left - 1) as u8);
                    left = 0;
                }
            }
        } else {
            if value > SPARSE_VAL_MAX_VALUE {
                return None;
            }
            while left > 0 {
                let len = left.min(SPARSE_VAL_MAX_LEN);
                out.push(0x80 | ((value - 1) << 2) | (len - 1) as u8);
                left -= len;
            }
        }
        i += run;
    }
    Some(out)
}

/// The payload of a sketch with every register at zero.
pub(super) fn empty() -> Vec<u8> {
    let v = (HLL_REGISTERS - 1) as u16;
    vec![0x40 | (v >> 8) as u8, (v & 0xff) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_empty_payload() {
        let payload = empty();
        assert_eq!(payload, vec![0x7f, 0xff]);
        assert_eq!(encode(&vec![0u8; HLL_REGISTERS]).unwrap(), payload);
        assert_eq!(decode(&payload).unwrap(), vec![0u8; HLL_REGISTERS]);
        assert_eq!(get(&payload, HLL_REGISTERS - 1).unwrap(), 0);
    }

    #[test]
    fn test_encode_mixed_runs() {
        let mut registers = vec![0u8; HLL_REGISTERS];
        registers[3] = 2;
        for r in &mut registers[100..106] {
            *r = 32;
        }
        let payload = encode(&registers).unwrap();
        // ZERO x3, VAL 2 x1, XZERO x96
        assert_eq!(&payload[..4], &[0x02u8, 0x84, 0x40, 95]);
        assert_eq!(payload[4], 0x80 | (31 << 2) | 3); // VAL 32 x4
        assert_eq!(payload[5], 0x80 | (31 << 2) | 1); // VAL 32 x2
        assert_eq!(decode(&payload).unwrap(), registers);
        assert_eq!(get(&payload, 3).unwrap(), 2);
        assert_eq!(get(&payload, 104).unwrap(), 32);
        assert_eq!(get(&payload, 106).unwrap(), 0);
    }

    #[test]
    fn test_encode_rejects_large_values() {
        let mut registers = vec![0u8; HLL_REGISTERS];
        registers[42] = SPARSE_VAL_MAX_VALUE + 1;
        assert!(encode(&registers).is_none());
    }

    #[test]
    fn test_short_stream_is_corrupted() {
        // ZERO x64 covers only a fraction of the registers.
        let err = decode(&[0x3f]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedSketch);

        let mut hist = [0u32; 64];
        let err = histogram(&[0x7f], &mut hist).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedSketch);
    }

    #[test]
    fn test_overlong_stream_is_corrupted() {
        let mut payload = empty();
        payload.push(0x00);
        let err = decode(&payload).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptedSketch);
    }
}
