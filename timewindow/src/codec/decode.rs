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

use std::io;

/// A forward-only reader over a borrowed byte slice.
///
/// Every read returns `io::Result` so that call sites can attach a field tag with
/// [`insufficient_data`](super::assert::insufficient_data).
#[derive(Debug)]
pub(crate) struct SketchSlice<'a> {
    slice: &'a [u8],
    pos: usize,
}

impl<'a> SketchSlice<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice, pos: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.slice.len() - self.pos
    }

    pub fn read_exact(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("need {len} bytes, {} left", self.remaining()),
            ));
        }
        let out = &self.slice[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let bytes = self.read_exact(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> io::Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64_le(&mut self) -> io::Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance_position() {
        let bytes = [7u8, 2, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        let mut cursor = SketchSlice::new(&bytes);
        assert_eq!(cursor.read_exact(1).unwrap(), &[7u8]);
        assert_eq!(cursor.read_u32_le().unwrap(), 2);
        assert_eq!(cursor.read_i32_le().unwrap(), -1);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_short_read_fails_without_consuming() {
        let bytes = [1u8, 2, 3];
        let mut cursor = SketchSlice::new(&bytes);
        let err = cursor.read_u32_le().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(cursor.remaining(), 3);
    }
}
