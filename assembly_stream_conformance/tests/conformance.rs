// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-format conformance suite.
//!
//! Golden byte vectors lock in the encoding; the chunking tests lock in the
//! streaming contract (any split of a valid stream decodes identically).

use assembly_stream::ast::Operand;
use assembly_stream::builder::AssemblyBuilder;
use assembly_stream::builder::node::{self, Callee, SwitchArm};
use assembly_stream::cursor::ByteCursor;
use assembly_stream::decoder::{DecodeEvent, Decoder, decode};
use assembly_stream::disasm::disassemble;
use assembly_stream::format::{pack_with_imm, unpack_with_imm};
use assembly_stream::module::{Assembly, Export, FuncId, PoolKind, RetType, ValType};
use assembly_stream::opcode::{AnyOp, F64Op, I32Op, Kind, StmtOp, SwitchCaseOp};
use assembly_stream::verifier::verify_assembly;
use assembly_stream::DecodeError;

/// `fn add(a: i32, b: i32) -> i32 { return a + b; }`, default export.
fn add_module() -> Assembly {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
    let add = b.declare(sig).unwrap();
    b.define(
        add,
        0,
        0,
        0,
        node::stmts(vec![node::ret(node::i32_binary(
            I32Op::Add,
            node::i32_get_loc(0),
            node::i32_get_loc(1),
        ))]),
    )
    .unwrap();
    b.export_default(add).unwrap();
    b.build().unwrap()
}

/// A module exercising every section: constants, an overloaded import,
/// globals in all six runs, a pointer table, a switch/loop/comma body and a
/// record export.
fn kitchen_sink_module() -> Assembly {
    let mut b = AssemblyBuilder::new();
    let c0 = b.const_i32(40);
    let _c1 = b.const_i32(1000);
    let cf = b.const_f64(2.5);

    let isig = b.signature(RetType::I32, vec![ValType::I32]);
    let vsig = b.signature(RetType::Void, vec![]);
    let dsig = b.signature(RetType::F64, vec![ValType::F64]);

    let imp = b.import("host", &[isig, vsig]).unwrap();
    let imp_i32 = b.import_sig(imp, 0).unwrap();
    let imp_void = b.import_sig(imp, 1).unwrap();

    b.zero_global(ValType::I32).unwrap();
    b.zero_global(ValType::F64).unwrap();
    let gi = b.import_global(ValType::I32, "env_i").unwrap();
    b.import_global(ValType::F64, "env_d").unwrap();

    let f_main = b.declare(isig).unwrap();
    let f_flip = b.declare(isig).unwrap();
    let f_dbl = b.declare(dsig).unwrap();

    let table = b.pointer_table(isig, &[f_main, f_flip]).unwrap();

    b.define(
        f_main,
        1,
        0,
        1,
        node::stmts(vec![
            node::set_loc(1, node::i32_pool(c0)),
            node::switch(
                node::i32_get_loc(0),
                vec![
                    SwitchArm::Case0(-2),
                    SwitchArm::Case1(0, node::brk()),
                    SwitchArm::CaseN(
                        9,
                        vec![
                            node::set_glo(gi, node::i32_get_loc(1)),
                            node::call_stmt(Callee::Imp(imp_void), vec![]),
                        ],
                    ),
                    SwitchArm::DefaultN(vec![]),
                ],
            ),
            node::while_loop(
                node::i32_binary(I32Op::SLtI32, node::i32_get_loc(1), node::i32_lit(100)),
                node::block(vec![
                    node::set_loc(
                        1,
                        node::i32_comma(
                            node::call_void(Callee::Imp(imp_void), vec![]),
                            node::call_i32(
                                Callee::Ind(table, node::i32_get_loc(0)),
                                vec![node::i32_get_loc(1)],
                            ),
                        ),
                    ),
                    node::if_then(node::i32_get_glo(gi), node::brk()),
                ]),
            ),
            node::set_loc(
                2,
                node::f64_binary(F64Op::Mul, node::f64_pool(cf), node::f64_get_loc(2)),
            ),
            node::ret(node::i32_binary(
                I32Op::Add,
                node::call_i32(Callee::Imp(imp_i32), vec![node::i32_get_loc(0)]),
                node::i32_unary(I32Op::Neg, node::i32_get_loc(1)),
            )),
        ]),
    )
    .unwrap();

    b.define(
        f_flip,
        0,
        0,
        0,
        node::stmts(vec![node::ret(node::i32_unary(
            I32Op::LogicNot,
            node::i32_get_loc(0),
        ))]),
    )
    .unwrap();

    b.define(
        f_dbl,
        0,
        0,
        0,
        node::stmts(vec![node::ret(node::f64_binary(
            F64Op::Add,
            node::f64_get_loc(0),
            node::f64_get_loc(0),
        ))]),
    )
    .unwrap();

    b.export_record(&[("main", f_main), ("flip", f_flip)]).unwrap();
    b.build().unwrap()
}

#[test]
fn golden_add_module_bytes() {
    let bytes = add_module().encode().unwrap();
    let expected: &[u8] = &[
        0x77, 0x61, 0x73, 0x6d, // magic "wasm"
        0x23, 0x00, 0x00, 0x00, // total size = 35
        0x00, 0x00, 0x00, // constant counts
        0x01, 0x00, 0x02, 0x00, 0x00, // one signature: i32(i32, i32)
        0x00, 0x00, // imports
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // globals
        0x01, 0x00, // one declaration, signature 0
        0x00, // pointer tables
        0x80, // packed locals prefix: no extras
        0x01, // one statement
        0x05, // ret
        0x0e, // i32.add
        0xc0, // i32.get_loc 0 (packed)
        0xc1, // i32.get_loc 1 (packed)
        0x00, 0x00, // default export of function 0
    ];
    assert_eq!(bytes, expected);

    let back = decode(&bytes).unwrap();
    verify_assembly(&back).unwrap();
    assert_eq!(back.encode().unwrap(), bytes);

    // The decoded AST is ret(add(get_loc 0, get_loc 1)).
    assert_eq!(back.declarations.len(), 1);
    let body = &back.definitions[0].body;
    assert_eq!(body.len(), 1);
    let ret = &body.stmts[0];
    assert_eq!(ret.op, AnyOp::Stmt(StmtOp::Ret));
    assert_eq!(ret.operands.len(), 1);
    let add = ret.operands[0].node().unwrap();
    assert_eq!(add.op, AnyOp::I32(I32Op::Add));
    assert_eq!(add.operands.len(), 2);
    for (operand, index) in add.operands.iter().zip([0u32, 1]) {
        let get = operand.node().unwrap();
        assert_eq!(get.op, AnyOp::I32(I32Op::GetLoc));
        assert_eq!(get.operands, [Operand::Local(index)]);
        assert!(get.with_imm);
    }
    assert_eq!(back.definitions[0].body_len, 5);
}

#[test]
fn full_form_encodings_are_preserved_on_reencode() {
    let mut bytes = add_module().encode().unwrap();
    // Rewrite the packed `get_loc 0` as the full two-byte form.
    let packed_at = bytes.iter().position(|&b| b == 0xc0).unwrap();
    let _: Vec<u8> = bytes
        .splice(packed_at..packed_at + 1, [I32Op::GetLoc.byte(), 0x00])
        .collect();
    bytes[4] += 1; // declared size grows by one

    let back = decode(&bytes).unwrap();
    let get = back.definitions[0].body.stmts[0].operands[0]
        .node()
        .unwrap()
        .operands[0]
        .node()
        .unwrap();
    assert!(!get.with_imm);
    assert_eq!(back.encode().unwrap(), bytes);
}

#[test]
fn chunking_invariance() {
    for assembly in [add_module(), kitchen_sink_module()] {
        let bytes = assembly.encode().unwrap();
        let whole = decode(&bytes).unwrap();
        verify_assembly(&whole).unwrap();

        for chunk_len in [1usize, 2, 3, 5, 7, 13, bytes.len()] {
            let mut d = Decoder::new();
            for chunk in bytes.chunks(chunk_len) {
                d.feed(chunk).unwrap();
            }
            let chunked = d.finish().unwrap();
            assert_eq!(chunked, whole, "chunk len {chunk_len}");
        }

        // An uneven split pattern, including empty chunks.
        let mut d = Decoder::new();
        let mut offset = 0;
        for (i, len) in [1usize, 4, 2, 9, 3].iter().cycle().enumerate() {
            if offset >= bytes.len() {
                break;
            }
            if i % 3 == 0 {
                d.feed(&[]).unwrap();
            }
            let end = (offset + len).min(bytes.len());
            d.feed(&bytes[offset..end]).unwrap();
            offset = end;
        }
        assert_eq!(d.finish().unwrap(), whole);
    }
}

#[test]
fn reencode_is_byte_identical_for_canonical_streams() {
    for assembly in [add_module(), kitchen_sink_module()] {
        let bytes = assembly.encode().unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.encode().unwrap(), bytes);
        // The disassembly renders without panicking and names the export.
        let text = disassemble(&back).to_string();
        assert!(text.contains("export"));
    }
}

/// Three i32 constants delivered one byte at a time; the signatures section
/// must not begin until all three are read.
#[test]
fn constants_complete_before_signatures_begin() {
    let mut b = AssemblyBuilder::new();
    b.const_i32(7);
    b.const_i32(300);
    b.const_i32(1);
    let sig = b.signature(RetType::Void, vec![]);
    let f = b.declare(sig).unwrap();
    b.define(f, 0, 0, 0, node::stmts(vec![node::ret_void()])).unwrap();
    b.export_default(f).unwrap();
    let assembly = b.build().unwrap();
    let bytes = assembly.encode().unwrap();

    let whole = decode(&bytes).unwrap();

    let mut d = Decoder::new();
    let mut events = Vec::new();
    for byte in &bytes {
        events.extend(d.feed(core::slice::from_ref(byte)).unwrap());
    }
    let chunked = d.finish().unwrap();
    assert_eq!(chunked, whole);
    assert_eq!(chunked.consts_i32, [7, 300, 1]);

    let pools_at = events
        .iter()
        .position(|e| matches!(e, DecodeEvent::ConstantPools { i32_count: 3, .. }))
        .expect("constant pools event");
    let sigs_at = events
        .iter()
        .position(|e| matches!(e, DecodeEvent::Signatures { .. }))
        .expect("signatures event");
    assert!(pools_at < sigs_at);
}

/// A correct stream whose export references function `N` when only `N`
/// functions exist fails at the export section, after every body has
/// decoded.
#[test]
fn export_out_of_range_fails_at_export_not_earlier() {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::Void, vec![]);
    let f = b.declare(sig).unwrap();
    b.define(f, 0, 0, 0, node::stmts(vec![])).unwrap();
    b.export_default(f).unwrap();
    let mut bytes = b.build().unwrap().encode().unwrap();

    // Patch the export payload (last varint) to function index 1.
    *bytes.last_mut().unwrap() = 0x01;

    let mut d = Decoder::new();
    let err = d.feed(&bytes).unwrap_err();
    assert_eq!(
        err,
        DecodeError::OutOfBounds {
            pool: PoolKind::Declarations,
            index: 1,
            len: 1
        }
    );

    // The body had already decoded when the failure surfaced.
    let mut d = Decoder::new();
    let events = d.feed(&bytes[..bytes.len() - 2]).unwrap();
    assert!(
        events
            .iter()
            .any(|e| *e == DecodeEvent::FunctionBody { func: FuncId(0) })
    );
}

#[test]
fn pool_reference_boundaries_are_exact() {
    // lit_pool index == size - 1 decodes; index == size is fatal.
    let mut b = AssemblyBuilder::new();
    b.const_i32(11);
    b.const_i32(22);
    let sig = b.signature(RetType::I32, vec![]);
    let f = b.declare(sig).unwrap();
    b.define(f, 0, 0, 0, node::stmts(vec![node::ret(node::i32_pool(1))]))
        .unwrap();
    b.export_default(f).unwrap();
    let bytes = b.build().unwrap().encode().unwrap();
    let ok = decode(&bytes).unwrap();
    verify_assembly(&ok).unwrap();

    // The body is [count=1, ret, packed lit_pool imm=1]; patch the packed
    // byte's immediate from pool index 1 to pool index 2.
    let mut bad = bytes.clone();
    let pos = bad.iter().position(|&x| x == pack_with_imm(1, 1)).unwrap();
    bad[pos] = pack_with_imm(1, 2);
    assert_eq!(
        decode(&bad).unwrap_err(),
        DecodeError::OutOfBounds {
            pool: PoolKind::ConstI32,
            index: 2,
            len: 2
        }
    );
}

#[test]
fn switch_decodes_to_the_documented_operand_shape() {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::Void, vec![ValType::I32]);
    let f = b.declare(sig).unwrap();
    b.define(
        f,
        0,
        0,
        0,
        node::stmts(vec![node::switch(
            node::i32_get_loc(0),
            vec![SwitchArm::Case1(5, node::brk()), SwitchArm::DefaultN(vec![])],
        )]),
    )
    .unwrap();
    b.export_default(f).unwrap();
    let bytes = b.build().unwrap().encode().unwrap();
    let back = decode(&bytes).unwrap();
    verify_assembly(&back).unwrap();

    let switch = &back.definitions[0].body.stmts[0];
    assert_eq!(switch.op, AnyOp::Stmt(StmtOp::Switch));
    assert_eq!(switch.operands.len(), 6);
    assert_eq!(
        switch.operands[0].node().unwrap().op,
        AnyOp::I32(I32Op::GetLoc)
    );
    assert_eq!(switch.operands[1], Operand::Case(SwitchCaseOp::Case1));
    assert_eq!(switch.operands[2], Operand::I32(5));
    assert_eq!(
        switch.operands[3].node().unwrap().op,
        AnyOp::Stmt(StmtOp::Break)
    );
    assert_eq!(switch.operands[4], Operand::Case(SwitchCaseOp::DefaultN));
    assert_eq!(switch.operands[5], Operand::U32(0));
}

#[test]
fn varint_roundtrip_and_limits_via_cursor() {
    for v in [0u32, 1, 127, 128, 16383, 16384, 0x0fff_ffff, u32::MAX] {
        let mut w = assembly_stream::format::Writer::new();
        w.write_varint_u32(v);
        let bytes = w.into_vec();
        let mut c = ByteCursor::new();
        c.push(&bytes);
        assert_eq!(c.read_varint_u32().unwrap(), v);
        c.advance();
        assert_eq!(c.remaining(), 0, "minimal encoding for {v}");
    }

    let mut c = ByteCursor::new();
    c.push(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);
    assert!(matches!(
        c.read_varint_u32(),
        Err(assembly_stream::cursor::ReadError::Fatal(
            DecodeError::VarintTooLong
        ))
    ));
}

#[test]
fn packed_byte_roundtrip_for_every_with_imm_opcode() {
    for imm in 0u8..32 {
        for op in [StmtOp::SetLoc, StmtOp::SetGlo] {
            let sel = op.imm_selector().unwrap();
            assert_eq!(unpack_with_imm(pack_with_imm(sel, imm)), Some((sel, imm)));
            assert_eq!(StmtOp::from_selector(sel), Some(op));
        }
        for op in [I32Op::LitImm, I32Op::LitPool, I32Op::GetLoc] {
            let sel = op.imm_selector().unwrap();
            assert_eq!(unpack_with_imm(pack_with_imm(sel, imm)), Some((sel, imm)));
            assert_eq!(I32Op::from_selector(sel), Some(op));
        }
    }
    // Opcodes without a counterpart must refuse packing.
    assert_eq!(I32Op::Add.imm_selector(), None);
    assert_eq!(StmtOp::Switch.imm_selector(), None);
    assert_eq!(
        assembly_stream::opcode::VoidOp::CallInt.imm_selector(),
        None
    );
}

/// Void can only be a return type. A void return decodes statement-kind
/// roots; a void argument type byte is rejected outright.
#[test]
fn void_positions_follow_kind_rules() {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::Void, vec![]);
    let f = b.declare(sig).unwrap();
    b.define(
        f,
        0,
        0,
        0,
        node::stmts(vec![node::call_stmt(Callee::Int(f), vec![]), node::ret_void()]),
    )
    .unwrap();
    b.export_default(f).unwrap();
    let bytes = b.build().unwrap().encode().unwrap();
    let back = decode(&bytes).unwrap();
    verify_assembly(&back).unwrap();
    for stmt in back.definitions[0].body.iter() {
        assert_eq!(stmt.op.kind(), Kind::Stmt);
    }

    // Same module with the signature's argument list [Void] is corrupt.
    let mut bad = bytes.clone();
    // Signature section here is [count=1, ret=3, argc=0]; make it argc=1, ty=3.
    let sig_at = 8 + 3; // header + constant counts
    assert_eq!(&bad[sig_at..sig_at + 3], &[1, 3, 0]);
    let _: Vec<u8> = bad.splice(sig_at..sig_at + 3, [1, 3, 1, 3]).collect();
    bad[4] += 1;
    assert_eq!(decode(&bad).unwrap_err(), DecodeError::VoidArgument);
}

#[test]
fn record_export_roundtrips_names() {
    let assembly = kitchen_sink_module();
    let bytes = assembly.encode().unwrap();
    let back = decode(&bytes).unwrap();
    match &back.export {
        Export::Record(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].name, "main");
            assert_eq!(entries[1].name, "flip");
            assert_eq!(entries[1].func, FuncId(1));
        }
        Export::Default(_) => panic!("expected record export"),
    }
    assert_eq!(back.imports[0].name, "host");
    assert_eq!(back.globals[2].import_name.as_deref(), Some("env_i"));
}

#[test]
fn body_offsets_locate_the_encoded_statements() {
    let assembly = kitchen_sink_module();
    let bytes = assembly.encode().unwrap();
    let back = decode(&bytes).unwrap();
    for def in &back.definitions {
        let start = def.body_offset as usize;
        let end = start + def.body_len as usize;
        assert!(end <= bytes.len());
        // Each body begins with its statement-count varint.
        let mut c = ByteCursor::new();
        c.push(&bytes[start..end]);
        let count = c.read_varint_u32().unwrap();
        assert_eq!(count as usize, def.body.len());
    }
}
