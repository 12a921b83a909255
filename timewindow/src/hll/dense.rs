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

//! Dense register payload: six bits per register, packed least significant bit
//! first.
//!
//! Register `i` starts at bit `6 * i`. Reads and writes go through a 16-bit
//! little-endian window so that values straddling a byte boundary need no special
//! case.

use crate::hll::HLL_BITS;
use crate::hll::HLL_DENSE_SIZE;
use crate::hll::HLL_REGISTER_MAX;
use crate::hll::HLL_REGISTERS;

const VAL_MASK_6: u16 = HLL_REGISTER_MAX as u16;

#[inline]
fn locate(index: usize) -> (usize, u32) {
    let start_bit = index * HLL_BITS;
    (start_bit >> 3, (start_bit & 7) as u32)
}

/// Get value from a register.
#[inline]
pub(super) fn get(payload: &[u8], index: usize) -> u8 {
    let (byte_idx, shift) = locate(index);
    // The last register ends exactly on the final byte.
    let hi = payload.get(byte_idx + 1).copied().unwrap_or(0);
    let two_bytes = u16::from_le_bytes([payload[byte_idx], hi]);
    ((two_bytes >> shift) & VAL_MASK_6) as u8
}

/// Set value in a register, preserving its neighbours.
#[inline]
pub(super) fn put(payload: &mut [u8], index: usize, value: u8) {
    debug_assert!(value <= HLL_REGISTER_MAX, "6-bit value must be 0-63");

    let (byte_idx, shift) = locate(index);
    let hi = payload.get(byte_idx + 1).copied().unwrap_or(0);
    let mut two_bytes = u16::from_le_bytes([payload[byte_idx], hi]);

    two_bytes &= !(VAL_MASK_6 << shift);
    two_bytes |= ((value as u16) & VAL_MASK_6) << shift;

    let [lo, hi] = two_bytes.to_le_bytes();
    payload[byte_idx] = lo;
    if let Some(next) = payload.get_mut(byte_idx + 1) {
        *next = hi;
    }
}

/// Raises a register to `value` if that is larger. Returns whether it changed.
pub(super) fn update(payload: &mut [u8], index: usize, value: u8) -> bool {
    if value > get(payload, index) {
        put(payload, index, value);
        true
    } else {
        false
    }
}

/// Adds the value of every register to `histogram`.
pub(super) fn histogram(payload: &[u8], histogram: &mut [u32; 64]) {
    for index in 0..HLL_REGISTERS {
        histogram[get(payload, index) as usize] += 1;
    }
}

/// Unpacks all registers, one byte each.
pub(super) fn decode(payload: &[u8]) -> Vec<u8> {
    (0..HLL_REGISTERS).map(|index| get(payload, index)).collect()
}

/// Packs one byte per register into a dense payload.
pub(super) fn encode(registers: &[u8]) -> Vec<u8> {
    debug_assert_eq!(registers.len(), HLL_REGISTERS);
    let mut payload = vec![0u8; HLL_DENSE_SIZE];
    for (index, &value) in registers.iter().enumerate() {
        if value != 0 {
            put(&mut payload, index, value);
        }
    }
    payload
}
