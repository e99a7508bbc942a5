// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `assembly_stream`: a streaming binary codec for a compact
//! pre-WebAssembly bytecode module format.
//!
//! The decoder is fully incremental: input may arrive in arbitrarily sized
//! chunks, and a read that runs out of buffered bytes suspends cleanly
//! (rolling back to the last committed position) and resumes on the next
//! chunk, even in the middle of a deeply nested expression. Any chunking
//! of the same bytes produces an identical [`module::Assembly`].
//!
//! ## Example
//!
//! ```
//! use assembly_stream::builder::{AssemblyBuilder, node};
//! use assembly_stream::decoder::Decoder;
//! use assembly_stream::module::{RetType, ValType};
//! use assembly_stream::opcode::I32Op;
//! use assembly_stream::verifier::verify_assembly;
//!
//! // Build a module computing `fn add(a: i32, b: i32) -> i32 { a + b }`.
//! let mut b = AssemblyBuilder::new();
//! let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
//! let add = b.declare(sig)?;
//! b.define(
//!     add,
//!     0,
//!     0,
//!     0,
//!     node::stmts(vec![node::ret(node::i32_binary(
//!         I32Op::Add,
//!         node::i32_get_loc(0),
//!         node::i32_get_loc(1),
//!     ))]),
//! )?;
//! b.export_default(add)?;
//! let assembly = b.build()?;
//! let bytes = assembly.encode().unwrap();
//!
//! // Stream it back one byte at a time.
//! let mut d = Decoder::new();
//! for byte in &bytes {
//!     d.feed(core::slice::from_ref(byte)).unwrap();
//! }
//! let decoded = d.finish().unwrap();
//! verify_assembly(&decoded).unwrap();
//! assert_eq!(decoded.definitions[0].body, assembly.definitions[0].body);
//! # Ok::<(), assembly_stream::builder::BuildError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
mod astread;
pub mod builder;
pub mod cursor;
pub mod decoder;
pub mod disasm;
pub mod format;
pub mod module;
pub mod opcode;
pub mod verifier;
mod writer;

pub use decoder::{DecodeEvent, Decoder, decode};
pub use format::DecodeError;
pub use module::Assembly;
pub use writer::EncodeError;
