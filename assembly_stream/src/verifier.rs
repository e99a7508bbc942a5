// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Post-decode validation.
//!
//! The decoder checks only what it structurally needs (pool bounds and the
//! argument types that drive child dispatch). This pass walks a complete
//! [`Assembly`] read-only and asserts the rest: per-opcode operand shapes
//! and arities, kind/type agreement between references and their use
//! positions, call return types against expression positions, label depths
//! and break/continue placement, and container-level consistency (the
//! import-signature flattening, global run ordering, locals grouping).
//!
//! The walk is driven by an explicit frame stack, mirroring the decoder's
//! no-host-recursion discipline.

use alloc::vec::Vec;
use core::fmt;

use crate::ast::{AstNode, Operand};
use crate::module::{
    Assembly, Export, FuncDef, ImportSig, PoolKind, RetType, Signature, ValType,
};
use crate::opcode::{AnyOp, F32Op, F64Op, I32Op, Kind, StmtOp, SwitchCaseOp, VoidOp};

/// A verification failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The definition table does not cover every declaration.
    DefinitionCount {
        /// Number of declared functions.
        declared: u32,
        /// Number of defined functions.
        defined: u32,
    },
    /// A container-level cross-reference points outside its pool.
    DanglingReference {
        /// The referenced pool.
        pool: PoolKind,
        /// The offending index.
        index: u32,
        /// The pool length.
        len: u32,
    },
    /// The flattened import-signature table does not match the per-import
    /// signature lists.
    ImportFlatteningMismatch,
    /// The global table violates the six-run ordering invariant.
    GlobalsOutOfOrder,
    /// A function's leading locals do not match its signature's arguments.
    ArgLocalsMismatch {
        /// The offending function index.
        func: u32,
    },
    /// A function's extra locals are not grouped i32, f32, f64.
    ExtraLocalsOutOfOrder {
        /// The offending function index.
        func: u32,
    },
    /// A node's kind does not match the kind its position requires.
    KindMismatch {
        /// The enclosing function index.
        func: u32,
        /// The kind required by the position.
        expected: Kind,
        /// The kind found.
        found: Kind,
    },
    /// A node's operand list does not match its opcode's shape.
    OperandShape {
        /// The enclosing function index.
        func: u32,
        /// The offending opcode.
        op: AnyOp,
    },
    /// An in-tree reference points outside its pool.
    NodeReference {
        /// The enclosing function index.
        func: u32,
        /// The referenced pool.
        pool: PoolKind,
        /// The offending index.
        index: u32,
        /// The pool length.
        len: u32,
    },
    /// A referenced entity's type does not agree with its use position.
    TypeMismatch {
        /// The enclosing function index.
        func: u32,
        /// The offending opcode.
        op: AnyOp,
        /// The type the position requires.
        expected: RetType,
        /// The type found.
        found: RetType,
    },
    /// A `break` outside any loop or switch.
    BreakOutsideLoop {
        /// The enclosing function index.
        func: u32,
    },
    /// A `continue` outside any loop.
    ContinueOutsideLoop {
        /// The enclosing function index.
        func: u32,
    },
    /// A labeled break/continue names a label depth that is not in scope.
    LabelDepth {
        /// The enclosing function index.
        func: u32,
        /// The requested depth.
        depth: u32,
        /// The number of labels in scope.
        max: u32,
    },
    /// A `switch` node's operand sequence does not follow the case shapes.
    BadSwitchShape {
        /// The enclosing function index.
        func: u32,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefinitionCount { declared, defined } => {
                write!(f, "{declared} declarations but {defined} definitions")
            }
            Self::DanglingReference { pool, index, len } => {
                write!(f, "{} index {index} out of bounds (len {len})", pool.name())
            }
            Self::ImportFlatteningMismatch => {
                write!(f, "flattened import-signature table is inconsistent")
            }
            Self::GlobalsOutOfOrder => write!(f, "global table violates run ordering"),
            Self::ArgLocalsMismatch { func } => {
                write!(f, "function {func}: locals do not start with the arguments")
            }
            Self::ExtraLocalsOutOfOrder { func } => {
                write!(f, "function {func}: extra locals violate run ordering")
            }
            Self::KindMismatch {
                func,
                expected,
                found,
            } => write!(
                f,
                "function {func}: expected {} node, found {}",
                expected.name(),
                found.name()
            ),
            Self::OperandShape { func, op } => {
                write!(f, "function {func}: malformed {} node", op.name())
            }
            Self::NodeReference {
                func,
                pool,
                index,
                len,
            } => write!(
                f,
                "function {func}: {} index {index} out of bounds (len {len})",
                pool.name()
            ),
            Self::TypeMismatch {
                func,
                op,
                expected,
                found,
            } => write!(
                f,
                "function {func}: {} expects {}, found {}",
                op.name(),
                expected.name(),
                found.name()
            ),
            Self::BreakOutsideLoop { func } => {
                write!(f, "function {func}: break outside loop or switch")
            }
            Self::ContinueOutsideLoop { func } => {
                write!(f, "function {func}: continue outside loop")
            }
            Self::LabelDepth { func, depth, max } => {
                write!(f, "function {func}: label depth {depth} exceeds scope ({max})")
            }
            Self::BadSwitchShape { func } => {
                write!(f, "function {func}: malformed switch case sequence")
            }
        }
    }
}

impl core::error::Error for VerifyError {}

fn expr_kind(ty: ValType) -> Kind {
    match ty {
        ValType::I32 => Kind::ExprI32,
        ValType::F32 => Kind::ExprF32,
        ValType::F64 => Kind::ExprF64,
    }
}

fn kind_ret(kind: Kind) -> Option<RetType> {
    match kind {
        Kind::ExprI32 => Some(RetType::I32),
        Kind::ExprF32 => Some(RetType::F32),
        Kind::ExprF64 => Some(RetType::F64),
        Kind::ExprVoid => Some(RetType::Void),
        Kind::Stmt | Kind::SwitchCase => None,
    }
}

/// Verifies a complete assembly.
pub fn verify_assembly(a: &Assembly) -> Result<(), VerifyError> {
    verify_container(a)?;
    for (func, def) in a.definitions.iter().enumerate() {
        let func = func as u32;
        let sig = func_sig(a, func)?;
        verify_locals(func, sig, def)?;
        verify_body(a, func, sig, def)?;
    }
    Ok(())
}

fn dangling(pool: PoolKind, index: u32, len: usize) -> VerifyError {
    VerifyError::DanglingReference {
        pool,
        index,
        len: len as u32,
    }
}

fn verify_container(a: &Assembly) -> Result<(), VerifyError> {
    if a.declarations.len() != a.definitions.len() {
        return Err(VerifyError::DefinitionCount {
            declared: a.declarations.len() as u32,
            defined: a.definitions.len() as u32,
        });
    }

    for decl in &a.declarations {
        if decl.sig.0 as usize >= a.signatures.len() {
            return Err(dangling(PoolKind::Signatures, decl.sig.0, a.signatures.len()));
        }
    }

    // Re-derive the flattening from the per-import lists; it must match the
    // stored table exactly (entry order is the wire order).
    let mut expected: Vec<ImportSig> = Vec::with_capacity(a.import_sigs.len());
    for (i, import) in a.imports.iter().enumerate() {
        for &sig in &import.sigs {
            if sig.0 as usize >= a.signatures.len() {
                return Err(dangling(PoolKind::Signatures, sig.0, a.signatures.len()));
            }
            expected.push(ImportSig {
                import: crate::module::ImportId(i as u32),
                sig,
            });
        }
    }
    if expected != a.import_sigs {
        return Err(VerifyError::ImportFlatteningMismatch);
    }

    let mut phase = 0u8;
    for global in &a.globals {
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
            return Err(VerifyError::GlobalsOutOfOrder);
        }
        phase = this;
    }

    for table in &a.pointer_tables {
        if table.sig.0 as usize >= a.signatures.len() {
            return Err(dangling(PoolKind::Signatures, table.sig.0, a.signatures.len()));
        }
        for elem in &table.elems {
            if elem.0 as usize >= a.declarations.len() {
                return Err(dangling(
                    PoolKind::Declarations,
                    elem.0,
                    a.declarations.len(),
                ));
            }
        }
    }

    match &a.export {
        Export::Default(func) => {
            if func.0 as usize >= a.declarations.len() {
                return Err(dangling(
                    PoolKind::Declarations,
                    func.0,
                    a.declarations.len(),
                ));
            }
        }
        Export::Record(entries) => {
            for entry in entries {
                if entry.func.0 as usize >= a.declarations.len() {
                    return Err(dangling(
                        PoolKind::Declarations,
                        entry.func.0,
                        a.declarations.len(),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn func_sig(a: &Assembly, func: u32) -> Result<&Signature, VerifyError> {
    let decl = &a.declarations[func as usize];
    a.signatures
        .get(decl.sig.0 as usize)
        .ok_or_else(|| dangling(PoolKind::Signatures, decl.sig.0, a.signatures.len()))
}

fn verify_locals(func: u32, sig: &Signature, def: &FuncDef) -> Result<(), VerifyError> {
    let args = sig.args.len();
    if def.locals.len() < args {
        return Err(VerifyError::ArgLocalsMismatch { func });
    }
    for (local, &arg) in def.locals.iter().zip(sig.args.iter()) {
        if local.ty != arg {
            return Err(VerifyError::ArgLocalsMismatch { func });
        }
    }
    let mut phase = 0u8;
    for local in &def.locals[args..] {
        let this = match local.ty {
            ValType::I32 => 0,
            ValType::F32 => 1,
            ValType::F64 => 2,
        };
        if this < phase {
            return Err(VerifyError::ExtraLocalsOutOfOrder { func });
        }
        phase = this;
    }
    Ok(())
}

/// One pending node check.
struct Frame<'a> {
    node: &'a AstNode,
    expected: Kind,
    /// Enclosing loop/switch count (`break` targets).
    breaks: u32,
    /// Enclosing loop count (`continue` targets).
    conts: u32,
    /// Enclosing label count.
    labels: u32,
}

struct Walk<'a> {
    a: &'a Assembly,
    func: u32,
    ret: RetType,
    locals: &'a [crate::module::Local],
    stack: Vec<Frame<'a>>,
}

fn verify_body(a: &Assembly, func: u32, sig: &Signature, def: &FuncDef) -> Result<(), VerifyError> {
    let mut walk = Walk {
        a,
        func,
        ret: sig.ret,
        locals: &def.locals,
        stack: Vec::new(),
    };
    for stmt in def.body.iter() {
        walk.stack.push(Frame {
            node: stmt,
            expected: Kind::Stmt,
            breaks: 0,
            conts: 0,
            labels: 0,
        });
    }
    while let Some(frame) = walk.stack.pop() {
        walk.check(&frame)?;
    }
    Ok(())
}

impl<'a> Walk<'a> {
    fn shape(&self, op: AnyOp) -> VerifyError {
        VerifyError::OperandShape {
            func: self.func,
            op,
        }
    }

    fn node_ref(&self, pool: PoolKind, index: u32, len: usize) -> VerifyError {
        VerifyError::NodeReference {
            func: self.func,
            pool,
            index,
            len: len as u32,
        }
    }

    fn type_mismatch(&self, op: AnyOp, expected: RetType, found: RetType) -> VerifyError {
        VerifyError::TypeMismatch {
            func: self.func,
            op,
            expected,
            found,
        }
    }

    fn local_ty(&self, op: AnyOp, operand: &Operand) -> Result<ValType, VerifyError> {
        let Operand::Local(index) = operand else {
            return Err(self.shape(op));
        };
        self.locals
            .get(*index as usize)
            .map(|l| l.ty)
            .ok_or_else(|| self.node_ref(PoolKind::Locals, *index, self.locals.len()))
    }

    fn global_ty(&self, op: AnyOp, operand: &Operand) -> Result<ValType, VerifyError> {
        let Operand::Global(id) = operand else {
            return Err(self.shape(op));
        };
        self.a
            .globals
            .get(id.0 as usize)
            .map(|g| g.ty)
            .ok_or_else(|| self.node_ref(PoolKind::Globals, id.0, self.a.globals.len()))
    }

    fn push(&mut self, frame: &Frame<'a>, node: &'a AstNode, expected: Kind) {
        self.stack.push(Frame {
            node,
            expected,
            breaks: frame.breaks,
            conts: frame.conts,
            labels: frame.labels,
        });
    }

    fn push_child(
        &mut self,
        frame: &Frame<'a>,
        op: AnyOp,
        operand: &'a Operand,
        expected: Kind,
    ) -> Result<(), VerifyError> {
        let Operand::Node(node) = operand else {
            return Err(self.shape(op));
        };
        self.push(frame, node, expected);
        Ok(())
    }

    /// Validates the expression shapes shared by the three value kinds:
    /// leading reference checks, assignment/read type agreement, calls,
    /// `cond` and `comma`. `own` is the node's value type.
    fn check_value_common(
        &mut self,
        frame: &Frame<'a>,
        own: ValType,
        class: ExprClass,
    ) -> Result<bool, VerifyError> {
        let node = frame.node;
        let op = node.op;
        let ops = &node.operands;
        match class {
            ExprClass::LitPool => {
                let [Operand::Const(ty, index)] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                if *ty != own {
                    return Err(self.shape(op));
                }
                let len = match own {
                    ValType::I32 => self.a.consts_i32.len(),
                    ValType::F32 => self.a.consts_f32.len(),
                    ValType::F64 => self.a.consts_f64.len(),
                };
                if *index as usize >= len {
                    let pool = match own {
                        ValType::I32 => PoolKind::ConstI32,
                        ValType::F32 => PoolKind::ConstF32,
                        ValType::F64 => PoolKind::ConstF64,
                    };
                    return Err(self.node_ref(pool, *index, len));
                }
                Ok(true)
            }
            ExprClass::GetLoc => {
                let [operand] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                let ty = self.local_ty(op, operand)?;
                if ty != own {
                    return Err(self.type_mismatch(op, own.ret(), ty.ret()));
                }
                Ok(true)
            }
            ExprClass::GetGlo => {
                let [operand] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                let ty = self.global_ty(op, operand)?;
                if ty != own {
                    return Err(self.type_mismatch(op, own.ret(), ty.ret()));
                }
                Ok(true)
            }
            ExprClass::SetLoc => {
                let [operand, value] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                let ty = self.local_ty(op, operand)?;
                if ty != own {
                    return Err(self.type_mismatch(op, own.ret(), ty.ret()));
                }
                self.push_child(frame, op, value, expr_kind(own))?;
                Ok(true)
            }
            ExprClass::SetGlo => {
                let [operand, value] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                let ty = self.global_ty(op, operand)?;
                if ty != own {
                    return Err(self.type_mismatch(op, own.ret(), ty.ret()));
                }
                self.push_child(frame, op, value, expr_kind(own))?;
                Ok(true)
            }
            ExprClass::Cond => {
                let [c, t, e] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                self.push_child(frame, op, c, Kind::ExprI32)?;
                self.push_child(frame, op, t, expr_kind(own))?;
                self.push_child(frame, op, e, expr_kind(own))?;
                Ok(true)
            }
            ExprClass::Comma => {
                let [left, right] = ops.as_slice() else {
                    return Err(self.shape(op));
                };
                let Operand::Node(left_node) = left else {
                    return Err(self.shape(op));
                };
                // The left type is free; it is whatever the type tag said.
                let left_kind = left_node.op.kind();
                if kind_ret(left_kind).is_none() {
                    return Err(self.shape(op));
                }
                self.push(frame, left_node, left_kind);
                self.push_child(frame, op, right, expr_kind(own))?;
                Ok(true)
            }
            ExprClass::Other => Ok(false),
        }
    }

    fn check_call(
        &mut self,
        frame: &Frame<'a>,
        callee: CallTarget,
        position: Kind,
    ) -> Result<(), VerifyError> {
        let node = frame.node;
        let op = node.op;
        let ops = &node.operands;
        let (sig, arg_start) = match callee {
            CallTarget::Int => {
                let Some(Operand::Func(id)) = ops.first() else {
                    return Err(self.shape(op));
                };
                let decl = self
                    .a
                    .declarations
                    .get(id.0 as usize)
                    .ok_or_else(|| {
                        self.node_ref(PoolKind::Declarations, id.0, self.a.declarations.len())
                    })?;
                (sig_or_dangling(self.a, decl.sig.0)?, 1)
            }
            CallTarget::Imp => {
                let Some(Operand::ImportSig(id)) = ops.first() else {
                    return Err(self.shape(op));
                };
                let entry = self
                    .a
                    .import_sigs
                    .get(id.0 as usize)
                    .ok_or_else(|| {
                        self.node_ref(PoolKind::ImportSigs, id.0, self.a.import_sigs.len())
                    })?;
                (sig_or_dangling(self.a, entry.sig.0)?, 1)
            }
            CallTarget::Ind => {
                let Some(Operand::Table(id)) = ops.first() else {
                    return Err(self.shape(op));
                };
                let table = self
                    .a
                    .pointer_tables
                    .get(id.0 as usize)
                    .ok_or_else(|| {
                        self.node_ref(PoolKind::PointerTables, id.0, self.a.pointer_tables.len())
                    })?;
                let Some(elem) = ops.get(1) else {
                    return Err(self.shape(op));
                };
                self.push_child(frame, op, elem, Kind::ExprI32)?;
                (sig_or_dangling(self.a, table.sig.0)?, 2)
            }
        };

        if let Some(expected_ret) = kind_ret(position) {
            if sig.ret != expected_ret {
                return Err(self.type_mismatch(op, expected_ret, sig.ret));
            }
        }

        let args = &ops[arg_start.min(ops.len())..];
        if args.len() != sig.args.len() {
            return Err(self.shape(op));
        }
        for (operand, &ty) in args.iter().zip(sig.args.iter()) {
            self.push_child(frame, op, operand, expr_kind(ty))?;
        }
        Ok(())
    }

    fn check(&mut self, frame: &Frame<'a>) -> Result<(), VerifyError> {
        let node = frame.node;
        let found = node.op.kind();
        if found != frame.expected {
            return Err(VerifyError::KindMismatch {
                func: self.func,
                expected: frame.expected,
                found,
            });
        }
        match node.op {
            AnyOp::Stmt(op) => self.check_stmt(frame, op),
            AnyOp::I32(op) => self.check_i32(frame, op),
            AnyOp::F32(op) => self.check_f32(frame, op),
            AnyOp::F64(op) => self.check_f64(frame, op),
            AnyOp::Void(op) => match op {
                VoidOp::CallInt => self.check_call(frame, CallTarget::Int, Kind::ExprVoid),
                VoidOp::CallInd => self.check_call(frame, CallTarget::Ind, Kind::ExprVoid),
                VoidOp::CallImp => self.check_call(frame, CallTarget::Imp, Kind::ExprVoid),
            },
        }
    }

    fn check_stmt(&mut self, frame: &Frame<'a>, op: StmtOp) -> Result<(), VerifyError> {
        let node = frame.node;
        let any = node.op;
        let ops = &node.operands;
        match op {
            StmtOp::SetLoc => {
                let [operand, value] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                let ty = self.local_ty(any, operand)?;
                self.push_child(frame, any, value, expr_kind(ty))
            }
            StmtOp::SetGlo => {
                let [operand, value] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                let ty = self.global_ty(any, operand)?;
                self.push_child(frame, any, value, expr_kind(ty))
            }
            StmtOp::CallInt => self.check_call(frame, CallTarget::Int, Kind::Stmt),
            StmtOp::CallInd => self.check_call(frame, CallTarget::Ind, Kind::Stmt),
            StmtOp::CallImp => self.check_call(frame, CallTarget::Imp, Kind::Stmt),
            StmtOp::Ret => match self.ret.val() {
                None => {
                    if !ops.is_empty() {
                        return Err(self.shape(any));
                    }
                    Ok(())
                }
                Some(ty) => {
                    let [value] = ops.as_slice() else {
                        return Err(self.shape(any));
                    };
                    self.push_child(frame, any, value, expr_kind(ty))
                }
            },
            StmtOp::Block => {
                for operand in ops {
                    self.push_child(frame, any, operand, Kind::Stmt)?;
                }
                Ok(())
            }
            StmtOp::IfThen => {
                let [c, t] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                self.push_child(frame, any, c, Kind::ExprI32)?;
                self.push_child(frame, any, t, Kind::Stmt)
            }
            StmtOp::IfElse => {
                let [c, t, e] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                self.push_child(frame, any, c, Kind::ExprI32)?;
                self.push_child(frame, any, t, Kind::Stmt)?;
                self.push_child(frame, any, e, Kind::Stmt)
            }
            StmtOp::While | StmtOp::Do => {
                let [x, y] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                let (cond, body) = if op == StmtOp::While { (x, y) } else { (y, x) };
                self.push_child(frame, any, cond, Kind::ExprI32)?;
                let Operand::Node(body_node) = body else {
                    return Err(self.shape(any));
                };
                self.stack.push(Frame {
                    node: body_node,
                    expected: Kind::Stmt,
                    breaks: frame.breaks + 1,
                    conts: frame.conts + 1,
                    labels: frame.labels,
                });
                Ok(())
            }
            StmtOp::Label => {
                let [body] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                let Operand::Node(body_node) = body else {
                    return Err(self.shape(any));
                };
                self.stack.push(Frame {
                    node: body_node,
                    expected: Kind::Stmt,
                    breaks: frame.breaks,
                    conts: frame.conts,
                    labels: frame.labels + 1,
                });
                Ok(())
            }
            StmtOp::Break => {
                if frame.breaks == 0 {
                    return Err(VerifyError::BreakOutsideLoop { func: self.func });
                }
                if !ops.is_empty() {
                    return Err(self.shape(any));
                }
                Ok(())
            }
            StmtOp::Continue => {
                if frame.conts == 0 {
                    return Err(VerifyError::ContinueOutsideLoop { func: self.func });
                }
                if !ops.is_empty() {
                    return Err(self.shape(any));
                }
                Ok(())
            }
            StmtOp::BreakLabel | StmtOp::ContinueLabel => {
                let [Operand::U32(depth)] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                if *depth >= frame.labels {
                    return Err(VerifyError::LabelDepth {
                        func: self.func,
                        depth: *depth,
                        max: frame.labels,
                    });
                }
                Ok(())
            }
            StmtOp::Switch => self.check_switch(frame),
        }
    }

    fn check_switch(&mut self, frame: &Frame<'a>) -> Result<(), VerifyError> {
        let node = frame.node;
        let any = node.op;
        let ops = &node.operands;
        let Some(cond) = ops.first() else {
            return Err(self.shape(any));
        };
        self.push_child(frame, any, cond, Kind::ExprI32)?;

        let func = self.func;
        let bad = move || VerifyError::BadSwitchShape { func };
        let mut nested = |walk: &mut Self, operand: &'a Operand| -> Result<(), VerifyError> {
            let Operand::Node(n) = operand else {
                return Err(bad());
            };
            walk.stack.push(Frame {
                node: n,
                expected: Kind::Stmt,
                breaks: frame.breaks + 1,
                conts: frame.conts,
                labels: frame.labels,
            });
            Ok(())
        };

        let mut i = 1;
        while i < ops.len() {
            let Operand::Case(case) = &ops[i] else {
                return Err(bad());
            };
            i += 1;
            match case {
                SwitchCaseOp::Case0 | SwitchCaseOp::Case1 | SwitchCaseOp::CaseN => {
                    let Some(Operand::I32(_)) = ops.get(i) else {
                        return Err(bad());
                    };
                    i += 1;
                    match case {
                        SwitchCaseOp::Case0 => {}
                        SwitchCaseOp::Case1 => {
                            nested(self, ops.get(i).ok_or_else(bad)?)?;
                            i += 1;
                        }
                        _ => {
                            let Some(Operand::U32(n)) = ops.get(i) else {
                                return Err(bad());
                            };
                            let n = *n as usize;
                            i += 1;
                            for _ in 0..n {
                                nested(self, ops.get(i).ok_or_else(bad)?)?;
                                i += 1;
                            }
                        }
                    }
                }
                SwitchCaseOp::Default0 => {}
                SwitchCaseOp::Default1 => {
                    nested(self, ops.get(i).ok_or_else(bad)?)?;
                    i += 1;
                }
                SwitchCaseOp::DefaultN => {
                    let Some(Operand::U32(n)) = ops.get(i) else {
                        return Err(bad());
                    };
                    let n = *n as usize;
                    i += 1;
                    for _ in 0..n {
                        nested(self, ops.get(i).ok_or_else(bad)?)?;
                        i += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_i32(&mut self, frame: &Frame<'a>, op: I32Op) -> Result<(), VerifyError> {
        let node = frame.node;
        let any = node.op;
        let ops = &node.operands;
        let class = match op {
            I32Op::LitPool => ExprClass::LitPool,
            I32Op::GetLoc => ExprClass::GetLoc,
            I32Op::GetGlo => ExprClass::GetGlo,
            I32Op::SetLoc => ExprClass::SetLoc,
            I32Op::SetGlo => ExprClass::SetGlo,
            I32Op::Cond => ExprClass::Cond,
            I32Op::Comma => ExprClass::Comma,
            _ => ExprClass::Other,
        };
        if self.check_value_common(frame, ValType::I32, class)? {
            return Ok(());
        }
        match op {
            I32Op::LitImm => {
                let [Operand::U32(_)] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                Ok(())
            }
            I32Op::CallInt => self.check_call(frame, CallTarget::Int, Kind::ExprI32),
            I32Op::CallInd => self.check_call(frame, CallTarget::Ind, Kind::ExprI32),
            I32Op::CallImp => self.check_call(frame, CallTarget::Imp, Kind::ExprI32),
            I32Op::FromF32 => self.unary(frame, Kind::ExprF32),
            I32Op::FromF64 => self.unary(frame, Kind::ExprF64),
            I32Op::Neg | I32Op::BitNot | I32Op::Clz | I32Op::LogicNot | I32Op::Abs => {
                self.unary(frame, Kind::ExprI32)
            }
            I32Op::EqF32
            | I32Op::NEqF32
            | I32Op::LtF32
            | I32Op::LeF32
            | I32Op::GtF32
            | I32Op::GeF32 => self.binary(frame, Kind::ExprF32),
            I32Op::EqF64
            | I32Op::NEqF64
            | I32Op::LtF64
            | I32Op::LeF64
            | I32Op::GtF64
            | I32Op::GeF64 => self.binary(frame, Kind::ExprF64),
            _ => self.binary(frame, Kind::ExprI32),
        }
    }

    fn check_f32(&mut self, frame: &Frame<'a>, op: F32Op) -> Result<(), VerifyError> {
        let node = frame.node;
        let any = node.op;
        let ops = &node.operands;
        let class = match op {
            F32Op::LitPool => ExprClass::LitPool,
            F32Op::GetLoc => ExprClass::GetLoc,
            F32Op::GetGlo => ExprClass::GetGlo,
            F32Op::SetLoc => ExprClass::SetLoc,
            F32Op::SetGlo => ExprClass::SetGlo,
            F32Op::Cond => ExprClass::Cond,
            F32Op::Comma => ExprClass::Comma,
            _ => ExprClass::Other,
        };
        if self.check_value_common(frame, ValType::F32, class)? {
            return Ok(());
        }
        match op {
            F32Op::LitImm => {
                let [Operand::F32(_)] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                Ok(())
            }
            F32Op::CallInt => self.check_call(frame, CallTarget::Int, Kind::ExprF32),
            F32Op::CallInd => self.check_call(frame, CallTarget::Ind, Kind::ExprF32),
            F32Op::CallImp => self.check_call(frame, CallTarget::Imp, Kind::ExprF32),
            F32Op::FromI32 => self.unary(frame, Kind::ExprI32),
            F32Op::FromF64 => self.unary(frame, Kind::ExprF64),
            F32Op::Neg | F32Op::Abs | F32Op::Ceil | F32Op::Floor | F32Op::Sqrt => {
                self.unary(frame, Kind::ExprF32)
            }
            _ => self.binary(frame, Kind::ExprF32),
        }
    }

    fn check_f64(&mut self, frame: &Frame<'a>, op: F64Op) -> Result<(), VerifyError> {
        let node = frame.node;
        let any = node.op;
        let ops = &node.operands;
        let class = match op {
            F64Op::LitPool => ExprClass::LitPool,
            F64Op::GetLoc => ExprClass::GetLoc,
            F64Op::GetGlo => ExprClass::GetGlo,
            F64Op::SetLoc => ExprClass::SetLoc,
            F64Op::SetGlo => ExprClass::SetGlo,
            F64Op::Cond => ExprClass::Cond,
            F64Op::Comma => ExprClass::Comma,
            _ => ExprClass::Other,
        };
        if self.check_value_common(frame, ValType::F64, class)? {
            return Ok(());
        }
        match op {
            F64Op::LitImm => {
                let [Operand::F64(_)] = ops.as_slice() else {
                    return Err(self.shape(any));
                };
                Ok(())
            }
            F64Op::CallInt => self.check_call(frame, CallTarget::Int, Kind::ExprF64),
            F64Op::CallInd => self.check_call(frame, CallTarget::Ind, Kind::ExprF64),
            F64Op::CallImp => self.check_call(frame, CallTarget::Imp, Kind::ExprF64),
            F64Op::FromI32 => self.unary(frame, Kind::ExprI32),
            F64Op::FromF32 => self.unary(frame, Kind::ExprF32),
            F64Op::Neg
            | F64Op::Abs
            | F64Op::Ceil
            | F64Op::Floor
            | F64Op::Sqrt
            | F64Op::Cos
            | F64Op::Sin
            | F64Op::Tan
            | F64Op::ACos
            | F64Op::ASin
            | F64Op::ATan
            | F64Op::Exp
            | F64Op::Ln => self.unary(frame, Kind::ExprF64),
            _ => self.binary(frame, Kind::ExprF64),
        }
    }

    fn unary(&mut self, frame: &Frame<'a>, child: Kind) -> Result<(), VerifyError> {
        let any = frame.node.op;
        let [a] = frame.node.operands.as_slice() else {
            return Err(self.shape(any));
        };
        self.push_child(frame, any, a, child)
    }

    fn binary(&mut self, frame: &Frame<'a>, child: Kind) -> Result<(), VerifyError> {
        let any = frame.node.op;
        let [a, b] = frame.node.operands.as_slice() else {
            return Err(self.shape(any));
        };
        self.push_child(frame, any, a, child)?;
        self.push_child(frame, any, b, child)
    }
}

#[derive(Copy, Clone)]
enum CallTarget {
    Int,
    Imp,
    Ind,
}

#[derive(Copy, Clone)]
enum ExprClass {
    LitPool,
    GetLoc,
    GetGlo,
    SetLoc,
    SetGlo,
    Cond,
    Comma,
    Other,
}

fn sig_or_dangling(a: &Assembly, sig: u32) -> Result<&Signature, VerifyError> {
    a.signatures
        .get(sig as usize)
        .ok_or_else(|| dangling(PoolKind::Signatures, sig, a.signatures.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::node::{self, Callee};
    use crate::builder::AssemblyBuilder;
    use crate::module::FuncId;
    use alloc::vec;

    fn build_valid() -> Assembly {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
        let vsig = b.signature(RetType::Void, vec![]);
        let f = b.declare(sig).unwrap();
        let g = b.declare(vsig).unwrap();
        b.define(
            f,
            1,
            0,
            0,
            node::stmts(vec![
                node::set_loc(2, node::i32_lit(7)),
                node::ret(node::i32_binary(
                    crate::opcode::I32Op::Add,
                    node::i32_get_loc(0),
                    node::i32_get_loc(2),
                )),
            ]),
        )
        .unwrap();
        b.define(
            g,
            0,
            0,
            0,
            node::stmts(vec![node::while_loop(
                node::i32_lit(0),
                node::block(vec![node::brk(), node::cont()]),
            )]),
        )
        .unwrap();
        b.export_default(f).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn valid_assembly_verifies() {
        verify_assembly(&build_valid()).unwrap();
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::Void, vec![]);
        let f = b.declare(sig).unwrap();
        b.define(f, 0, 0, 0, node::stmts(vec![node::brk()])).unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::BreakOutsideLoop { func: 0 }
        );
    }

    #[test]
    fn label_depth_is_scoped() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::Void, vec![]);
        let f = b.declare(sig).unwrap();
        b.define(
            f,
            0,
            0,
            0,
            node::stmts(vec![node::label(node::brk_label(1))]),
        )
        .unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::LabelDepth {
                func: 0,
                depth: 1,
                max: 1
            }
        );
    }

    #[test]
    fn get_loc_type_must_match_position() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::I32, vec![ValType::F64]);
        let f = b.declare(sig).unwrap();
        b.define(
            f,
            0,
            0,
            0,
            node::stmts(vec![node::ret(node::i32_get_loc(0))]),
        )
        .unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::TypeMismatch {
                func: 0,
                op: AnyOp::I32(I32Op::GetLoc),
                expected: RetType::I32,
                found: RetType::F64
            }
        );
    }

    #[test]
    fn call_return_type_must_match_expression_position() {
        let mut b = AssemblyBuilder::new();
        let isig = b.signature(RetType::I32, vec![]);
        let fsig = b.signature(RetType::F64, vec![]);
        let f = b.declare(isig).unwrap();
        let g = b.declare(fsig).unwrap();
        b.define(
            f,
            0,
            0,
            0,
            // ret (i32.call_int g) where g returns f64.
            node::stmts(vec![node::ret(node::call_i32(Callee::Int(g), vec![]))]),
        )
        .unwrap();
        b.define(g, 0, 0, 0, node::stmts(vec![node::ret(node::f64_lit(0.0))]))
            .unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::TypeMismatch {
                func: 0,
                op: AnyOp::I32(I32Op::CallInt),
                expected: RetType::I32,
                found: RetType::F64
            }
        );
    }

    #[test]
    fn call_arity_must_match_signature() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::Void, vec![ValType::I32]);
        let f = b.declare(sig).unwrap();
        b.define(
            f,
            0,
            0,
            0,
            node::stmts(vec![node::call_stmt(Callee::Int(FuncId(0)), vec![])]),
        )
        .unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::OperandShape {
                func: 0,
                op: AnyOp::Stmt(StmtOp::CallInt)
            }
        );
    }

    #[test]
    fn stmt_position_rejects_expression_nodes() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::Void, vec![]);
        let f = b.declare(sig).unwrap();
        b.define(f, 0, 0, 0, node::stmts(vec![node::i32_lit(1)])).unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        assert_eq!(
            verify_assembly(&a).unwrap_err(),
            VerifyError::KindMismatch {
                func: 0,
                expected: Kind::Stmt,
                found: Kind::ExprI32
            }
        );
    }

    #[test]
    fn decoded_switch_verifies() {
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
                vec![
                    node::SwitchArm::Case1(-1, node::brk()),
                    node::SwitchArm::CaseN(4, vec![node::ret_void(), node::brk()]),
                    node::SwitchArm::DefaultN(vec![]),
                ],
            )]),
        )
        .unwrap();
        b.export_default(f).unwrap();
        let a = b.build().unwrap();
        verify_assembly(&a).unwrap();

        // And the same module survives an encode/decode round trip.
        let bytes = a.encode().unwrap();
        let back = crate::decoder::decode(&bytes).unwrap();
        verify_assembly(&back).unwrap();
        assert_eq!(back.definitions[0].body, a.definitions[0].body);
    }
}
