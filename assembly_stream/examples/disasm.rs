// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disassembler example.
//!
//! Builds a small module, encodes it, stream-decodes it in 3-byte chunks
//! and prints the disassembly. Run with:
//! `cargo run -p assembly_stream --example disasm`

use assembly_stream::builder::{AssemblyBuilder, node};
use assembly_stream::decoder::Decoder;
use assembly_stream::disasm::disassemble;
use assembly_stream::module::{RetType, ValType};
use assembly_stream::opcode::I32Op;

fn main() {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
    let max = b.declare(sig).unwrap();

    // fn max(a: i32, b: i32) -> i32 { return (a > b) ? a : b; }
    b.define(
        max,
        0,
        0,
        0,
        node::stmts(vec![node::ret(node::i32_cond(
            node::i32_binary(I32Op::SGtI32, node::i32_get_loc(0), node::i32_get_loc(1)),
            node::i32_get_loc(0),
            node::i32_get_loc(1),
        ))]),
    )
    .unwrap();
    b.export_default(max).unwrap();

    let bytes = b.build().unwrap().encode().unwrap();
    println!("{} encoded bytes", bytes.len());

    let mut d = Decoder::new();
    for chunk in bytes.chunks(3) {
        for event in d.feed(chunk).unwrap() {
            println!("event: {event:?}");
        }
    }
    let assembly = d.finish().unwrap();
    print!("{}", disassemble(&assembly));
}
