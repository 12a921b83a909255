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

//! Cardinality estimation from a register histogram.
//!
//! The raw estimate is the bias-corrected harmonic mean `alpha * m^2 / sum(2^-r)`.
//! Three range corrections follow:
//!
//! - small range: linear counting `m * ln(m / zeros)` while the raw estimate is
//!   below `2.5 * m` and some registers are still zero;
//! - mid range: an empirical bias polynomial for `m = 16384`, below 72000;
//! - large range: `-2^32 * ln(1 - E / 2^32)` once the estimate passes `2^32 / 30`.
//!   Above `2^32` the raw value is kept, since the hash has 64 bits.

use crate::hll::HLL_REGISTERS;

const ALPHA: f64 = 0.7213 / (1.0 + 1.079 / HLL_REGISTERS as f64);
const BIAS_CORRECTION_LIMIT: f64 = 72000.0;
const TWO_POW_32: f64 = 4_294_967_296.0;

/// Estimates the cardinality of a sketch whose register values are counted in
/// `histogram`. Pure function of its input.
pub(super) fn estimate(histogram: &[u32; 64]) -> u64 {
    let m = HLL_REGISTERS as f64;

    let sum: f64 = histogram
        .iter()
        .enumerate()
        .filter(|(_, n)| **n != 0)
        .map(|(value, &n)| n as f64 * inv_pow2(value as i32))
        .sum();
    let zeros = histogram[0];

    let mut e = ALPHA * m * m / sum;
    if e < 2.5 * m && zeros != 0 {
        e = linear_counting(m, zeros as f64);
    } else if e < BIAS_CORRECTION_LIMIT {
        let bias = 5.9119e-18 * e.powi(4) - 1.4253e-12 * e.powi(3) + 1.2940e-7 * e.powi(2)
            - 5.2921e-3 * e
            + 83.3216;
        e -= e * (bias / 100.0);
    } else if e > TWO_POW_32 / 30.0 && e < TWO_POW_32 {
        e = -TWO_POW_32 * (1.0 - e / TWO_POW_32).ln();
    }
    e.round() as u64
}

#[inline]
fn linear_counting(m: f64, zeros: f64) -> f64 {
    m * (m / zeros).ln()
}

#[inline]
fn inv_pow2(value: i32) -> f64 {
    2f64.powi(-value)
}
