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

//! Header layout of a serialized sketch.

/// Magic tag identifying a sketch buffer.
pub const HLL_MAGIC: [u8; 4] = *b"HYLL";
/// Size of the fixed header preceding the register payload.
pub const HLL_HEADER_SIZE: usize = 16;

/// Offset of the magic tag.
pub(super) const MAGIC_OFFSET: usize = 0;
/// Offset of the encoding tag byte.
pub(super) const ENCODING_BYTE: usize = 4;
/// Offset of the three reserved bytes.
pub(super) const RESERVED_OFFSET: usize = 5;
/// Offset of the cached cardinality (little-endian u64).
pub(super) const CARD_OFFSET: usize = 8;

/// Bit of the cached cardinality marking it stale.
pub(super) const CACHE_INVALID_FLAG: u64 = 1 << 63;

/// Writes a fresh header with a valid zero cache.
pub(super) fn write_header(bytes: &mut [u8], encoding_tag: u8) {
    bytes[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&HLL_MAGIC);
    bytes[ENCODING_BYTE] = encoding_tag;
    bytes[RESERVED_OFFSET..CARD_OFFSET].fill(0);
    write_card(bytes, 0);
}

#[inline]
pub(super) fn read_card(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[CARD_OFFSET],
        bytes[CARD_OFFSET + 1],
        bytes[CARD_OFFSET + 2],
        bytes[CARD_OFFSET + 3],
        bytes[CARD_OFFSET + 4],
        bytes[CARD_OFFSET + 5],
        bytes[CARD_OFFSET + 6],
        bytes[CARD_OFFSET + 7],
    ])
}

#[inline]
pub(super) fn write_card(bytes: &mut [u8], card: u64) {
    bytes[CARD_OFFSET..CARD_OFFSET + 8].copy_from_slice(&card.to_le_bytes());
}
