// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance suite for the `assembly_stream` wire format.
//!
//! All tests live in `tests/conformance.rs`; this crate intentionally has no
//! library surface.
