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

//! Time-windowed aggregate values for key-value stores.
//!
//! - [`window::WindowedCounter`] keeps a rolling sum over the last `N` time buckets.
//! - [`window::WindowedUniqueEstimator`] keeps a rolling distinct-count estimate,
//!   one [`hll::HyperLogLog`] per bucket.
//! - [`store`] runs the key-level commands against a host [`store::Keyspace`].
//!
//! Every value has a fixed little-endian binary layout, documented on its type.

pub mod error;
pub mod hash;
pub mod hll;
pub mod store;
pub mod window;

mod codec;
