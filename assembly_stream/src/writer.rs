// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The encode direction: [`Assembly`] back to wire bytes.
//!
//! The writer is eager (no incremental-resume concerns) but mirrors the
//! reader's grammar exactly, including the AST operand ordering: a node's
//! operand list is already in wire order, so encoding a body is a front-to-
//! back walk driven by an explicit frame stack (decoded trees can be
//! arbitrarily deep, so the encoder avoids host recursion just like the
//! decoder does).
//!
//! Nodes whose `with_imm` flag is set are re-encoded in the packed
//! opcode-with-immediate form when their leading operand still fits; this
//! makes `encode(decode(bytes)) == bytes` for canonically encoded input.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::ast::{AstNode, Operand, StmtList};
use crate::format::{IMM_LIMIT, MAGIC, Writer, pack_with_imm};
use crate::module::{Assembly, Export, FuncDef, Global, Local, Signature, ValType};
use crate::opcode::{AnyOp, ExportFormat, F32Op, F64Op, I32Op, Kind, StmtOp};

/// An encode failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// A name contains an embedded NUL and cannot be written as a
    /// NUL-terminated string.
    NulInName {
        /// The offending name.
        name: String,
    },
    /// The global table violates the six-run ordering invariant
    /// (zero-initialized i32/f32/f64, then imported i32/f32/f64).
    GlobalsOutOfOrder,
    /// A function's locals are not grouped as arguments followed by
    /// extra i32, f32 and f64 runs.
    LocalsOutOfOrder {
        /// The offending function index.
        func: u32,
    },
    /// A cross-reference points outside its pool.
    DanglingReference,
    /// A node's operand list does not match its opcode's shape.
    MalformedNode {
        /// The offending opcode.
        op: AnyOp,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NulInName { name } => write!(f, "name {name:?} contains NUL"),
            Self::GlobalsOutOfOrder => write!(f, "global table violates run ordering"),
            Self::LocalsOutOfOrder { func } => {
                write!(f, "function {func} locals violate run ordering")
            }
            Self::DanglingReference => write!(f, "dangling cross-reference"),
            Self::MalformedNode { op } => write!(f, "malformed {} node", op.name()),
        }
    }
}

impl core::error::Error for EncodeError {}

impl Assembly {
    /// Encodes the assembly to wire bytes, header included. The declared
    /// total size is recomputed, not echoed from [`Assembly::declared_size`].
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut body = Writer::new();
        self.write_constants(&mut body);
        self.write_signatures(&mut body);
        self.write_imports(&mut body)?;
        self.write_globals(&mut body)?;
        self.write_declarations(&mut body);
        self.write_tables(&mut body);
        self.write_definitions(&mut body)?;
        self.write_export(&mut body)?;

        let mut out = Writer::new();
        out.write_u32_le(MAGIC);
        out.write_u32_le(body.len() as u32 + 8);
        out.write_bytes(body.as_slice());
        Ok(out.into_vec())
    }

    fn write_constants(&self, w: &mut Writer) {
        w.write_varint_u32(self.consts_i32.len() as u32);
        w.write_varint_u32(self.consts_f32.len() as u32);
        w.write_varint_u32(self.consts_f64.len() as u32);
        for &v in &self.consts_i32 {
            w.write_varint_u32(v);
        }
        for &v in &self.consts_f32 {
            w.write_f32_le(v);
        }
        for &v in &self.consts_f64 {
            w.write_f64_le(v);
        }
    }

    fn write_signatures(&self, w: &mut Writer) {
        w.write_varint_u32(self.signatures.len() as u32);
        for sig in &self.signatures {
            w.write_u8(sig.ret.code());
            w.write_varint_u32(sig.args.len() as u32);
            for &arg in &sig.args {
                w.write_u8(arg.code());
            }
        }
    }

    fn write_imports(&self, w: &mut Writer) -> Result<(), EncodeError> {
        w.write_varint_u32(self.imports.len() as u32);
        w.write_varint_u32(self.import_sigs.len() as u32);
        for import in &self.imports {
            write_name(w, &import.name)?;
            w.write_varint_u32(import.sigs.len() as u32);
            for sig in &import.sigs {
                w.write_varint_u32(sig.0);
            }
        }
        Ok(())
    }

    fn write_globals(&self, w: &mut Writer) -> Result<(), EncodeError> {
        let runs = global_runs(&self.globals)?;
        for n in runs {
            w.write_varint_u32(n);
        }
        for global in &self.globals {
            if let Some(name) = &global.import_name {
                write_name(w, name)?;
            }
        }
        Ok(())
    }

    fn write_declarations(&self, w: &mut Writer) {
        w.write_varint_u32(self.declarations.len() as u32);
        for decl in &self.declarations {
            w.write_varint_u32(decl.sig.0);
        }
    }

    fn write_tables(&self, w: &mut Writer) {
        w.write_varint_u32(self.pointer_tables.len() as u32);
        for table in &self.pointer_tables {
            w.write_varint_u32(table.sig.0);
            w.write_varint_u32(table.elems.len() as u32);
            for elem in &table.elems {
                w.write_varint_u32(elem.0);
            }
        }
    }

    fn write_definitions(&self, w: &mut Writer) -> Result<(), EncodeError> {
        for (func, def) in self.definitions.iter().enumerate() {
            let decl = self
                .declarations
                .get(func)
                .ok_or(EncodeError::DanglingReference)?;
            let sig = self
                .signatures
                .get(decl.sig.0 as usize)
                .ok_or(EncodeError::DanglingReference)?;
            write_locals_prefix(w, sig, def, func as u32)?;
            write_stmt_list(w, &def.body)?;
        }
        Ok(())
    }

    fn write_export(&self, w: &mut Writer) -> Result<(), EncodeError> {
        match &self.export {
            Export::Default(func) => {
                w.write_u8(ExportFormat::Default.byte());
                w.write_varint_u32(func.0);
            }
            Export::Record(entries) => {
                w.write_u8(ExportFormat::Record.byte());
                w.write_varint_u32(entries.len() as u32);
                for entry in entries {
                    write_name(w, &entry.name)?;
                    w.write_varint_u32(entry.func.0);
                }
            }
        }
        Ok(())
    }
}

fn write_name(w: &mut Writer, name: &str) -> Result<(), EncodeError> {
    if name.as_bytes().contains(&0) {
        return Err(EncodeError::NulInName {
            name: String::from(name),
        });
    }
    w.write_cstr(name);
    Ok(())
}

/// Computes the six global-run lengths, validating the ordering invariant.
fn global_runs(globals: &[Global]) -> Result<[u32; 6], EncodeError> {
    let mut runs = [0u32; 6];
    let mut phase = 0;
    for global in globals {
        let ty_index = match global.ty {
            ValType::I32 => 0,
            ValType::F32 => 1,
            ValType::F64 => 2,
        };
        let this = if global.import_name.is_some() {
            3 + ty_index
        } else {
            ty_index
        };
        if this < phase {
            return Err(EncodeError::GlobalsOutOfOrder);
        }
        phase = this;
        runs[this] += 1;
    }
    Ok(runs)
}

/// Splits a definition's locals into the three extra runs after the
/// signature's arguments, validating the grouping invariant.
fn extra_local_runs(sig: &Signature, def: &FuncDef, func: u32) -> Result<[u32; 3], EncodeError> {
    let args = sig.args.len();
    if def.locals.len() < args {
        return Err(EncodeError::LocalsOutOfOrder { func });
    }
    let mut runs = [0u32; 3];
    let mut phase = 0;
    for &Local { ty } in &def.locals[args..] {
        let this = match ty {
            ValType::I32 => 0,
            ValType::F32 => 1,
            ValType::F64 => 2,
        };
        if this < phase {
            return Err(EncodeError::LocalsOutOfOrder { func });
        }
        phase = this;
        runs[this] += 1;
    }
    Ok(runs)
}

fn write_locals_prefix(
    w: &mut Writer,
    sig: &Signature,
    def: &FuncDef,
    func: u32,
) -> Result<(), EncodeError> {
    let [i32s, f32s, f64s] = extra_local_runs(sig, def, func)?;
    if f32s == 0 && f64s == 0 && i32s < IMM_LIMIT {
        w.write_u8(pack_with_imm(0, i32s as u8));
        return Ok(());
    }
    let mut flags = 0u8;
    if i32s > 0 {
        flags |= 0x1;
    }
    if f32s > 0 {
        flags |= 0x2;
    }
    if f64s > 0 {
        flags |= 0x4;
    }
    w.write_u8(flags);
    for n in [i32s, f32s, f64s] {
        if n > 0 {
            w.write_varint_u32(n);
        }
    }
    Ok(())
}

/// Encodes one function body.
pub(crate) fn write_stmt_list(w: &mut Writer, list: &StmtList) -> Result<(), EncodeError> {
    w.write_varint_u32(list.len() as u32);
    for stmt in list.iter() {
        write_node(w, stmt)?;
    }
    Ok(())
}

struct Frame<'a> {
    node: &'a AstNode,
    next: usize,
}

fn write_node(w: &mut Writer, root: &AstNode) -> Result<(), EncodeError> {
    let mut stack: Vec<Frame<'_>> = Vec::new();
    start_node(w, root, &mut stack)?;
    while let Some(top) = stack.last_mut() {
        let node = top.node;
        if top.next >= node.operands.len() {
            stack.pop();
            continue;
        }
        let index = top.next;
        top.next += 1;
        match &node.operands[index] {
            Operand::U32(v) => w.write_varint_u32(*v),
            Operand::I32(v) => w.write_varint_i32(*v),
            Operand::F32(v) => w.write_f32_le(*v),
            Operand::F64(v) => w.write_f64_le(*v),
            Operand::Const(_, index) => w.write_varint_u32(*index),
            Operand::Local(index) => w.write_varint_u32(*index),
            Operand::Global(id) => w.write_varint_u32(id.0),
            Operand::Func(id) => w.write_varint_u32(id.0),
            Operand::ImportSig(id) => w.write_varint_u32(id.0),
            Operand::Table(id) => w.write_varint_u32(id.0),
            Operand::Case(op) => w.write_u8(op.byte()),
            Operand::Node(child) => start_node(w, child, &mut stack)?,
        }
    }
    Ok(())
}

/// Emits a node's header (opcode byte, packed immediate, leading count or
/// comma type tag) and pushes its operand frame.
fn start_node<'a>(
    w: &mut Writer,
    node: &'a AstNode,
    stack: &mut Vec<Frame<'a>>,
) -> Result<(), EncodeError> {
    if node.with_imm {
        if let Some((selector, imm)) = packable_imm(node) {
            w.write_u8(pack_with_imm(selector, imm));
            stack.push(Frame { node, next: 1 });
            return Ok(());
        }
    }

    w.write_u8(node.op.byte());
    match node.op {
        AnyOp::Stmt(StmtOp::Block) => {
            w.write_varint_u32(node.operands.len() as u32);
        }
        AnyOp::Stmt(StmtOp::Switch) => {
            let cases = node
                .operands
                .iter()
                .filter(|o| matches!(o, Operand::Case(_)))
                .count();
            w.write_varint_u32(cases as u32);
        }
        AnyOp::I32(I32Op::Comma) | AnyOp::F32(F32Op::Comma) | AnyOp::F64(F64Op::Comma) => {
            w.write_u8(comma_left_code(node)?);
        }
        _ => {}
    }
    stack.push(Frame { node, next: 0 });
    Ok(())
}

/// The packed form of a node, when its opcode has a with-immediate selector
/// and its leading operand fits in 5 bits.
fn packable_imm(node: &AstNode) -> Option<(u8, u8)> {
    let selector = node.op.imm_selector()?;
    let value = match node.operands.first()? {
        Operand::U32(v) => *v,
        Operand::Const(_, index) => *index,
        Operand::Local(index) => *index,
        Operand::Global(id) => id.0,
        _ => return None,
    };
    if value < IMM_LIMIT {
        Some((selector, value as u8))
    } else {
        None
    }
}

/// The `comma` type tag is not stored in the tree; it is re-derived from
/// the left child's kind.
fn comma_left_code(node: &AstNode) -> Result<u8, EncodeError> {
    let Some(Operand::Node(left)) = node.operands.first() else {
        return Err(EncodeError::MalformedNode { op: node.op });
    };
    match left.op.kind() {
        Kind::ExprI32 => Ok(0),
        Kind::ExprF32 => Ok(1),
        Kind::ExprF64 => Ok(2),
        Kind::ExprVoid => Ok(3),
        Kind::Stmt | Kind::SwitchCase => Err(EncodeError::MalformedNode { op: node.op }),
    }
}
