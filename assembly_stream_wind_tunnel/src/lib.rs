// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `assembly_stream`.
//!
//! The benchmarks live in `benches/decode.rs`; this crate intentionally has
//! no library surface.
