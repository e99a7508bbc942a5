// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-function AST decoding.
//!
//! One function body decodes as a forward tree of typed nodes driven by an
//! explicit *task stack* (pending "read a node of kind K" obligations) plus
//! an explicit *node stack* (in-progress parents awaiting children), never
//! the host call stack. A partially read, arbitrarily nested expression can
//! therefore suspend when the buffer runs dry and resume later without
//! losing context.
//!
//! The child kind for any position is fully determined by static
//! information (a signature's argument types, the enclosing function's
//! return type, a fixed rule of the parent opcode, or a literal type-tag
//! byte for `comma`); the decoder never sniffs the next opcode byte to pick
//! a grammar.
//!
//! Each task reads one node's complete fixed-shape header before
//! committing; a dry read rolls the cursor back and leaves the same task on
//! top of the stack, to be re-attempted verbatim on the next chunk.

use alloc::vec;
use alloc::vec::Vec;

use crate::ast::{AstNode, Operand, StmtList};
use crate::cursor::{ByteCursor, ReadError};
use crate::format::{DecodeError, unpack_with_imm};
use crate::module::{
    FuncDecl, FuncId, Global, GlobalId, ImportSig, ImportSigId, Local, PointerTable, PoolKind,
    RetType, SigId, Signature, TableId, ValType,
};
use crate::opcode::{AnyOp, F32Op, F64Op, I32Op, Kind, StmtOp, SwitchCaseOp, VoidOp};

/// Pool views and function-scoped typing context for one body decode.
#[derive(Copy, Clone)]
pub(crate) struct FnCtx<'a> {
    pub sigs: &'a [Signature],
    pub import_sigs: &'a [ImportSig],
    pub globals: &'a [Global],
    pub decls: &'a [FuncDecl],
    pub tables: &'a [PointerTable],
    pub locals: &'a [Local],
    pub consts_i32_len: usize,
    pub consts_f32_len: usize,
    pub consts_f64_len: usize,
    pub ret: RetType,
}

/// A pending decode obligation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Task {
    /// Read the body's leading statement count, then that many statements.
    StmtList,
    /// Read one statement.
    Stmt,
    /// Read one i32 expression.
    ExprI32,
    /// Read one f32 expression.
    ExprF32,
    /// Read one f64 expression.
    ExprF64,
    /// Read one void call expression.
    ExprVoid,
    /// Read one switch-case shape into the enclosing `switch` node.
    SwitchCase,
    /// The node on top of the node stack has all its children; detach it
    /// into its parent.
    Pop,
}

/// An in-progress container on the node stack.
#[derive(Debug)]
enum Slot {
    /// The body's root statement list.
    Root(Vec<AstNode>),
    /// A composite node still collecting children.
    Node(AstNode),
}

/// Result of driving the AST decoder against the currently buffered bytes.
#[derive(Debug, PartialEq)]
pub(crate) enum AstProgress {
    /// Out of buffered bytes; re-drive after the next push.
    Suspended,
    /// The body is fully decoded.
    Complete(StmtList),
}

/// The resumable per-function AST decoder.
#[derive(Debug)]
pub(crate) struct AstDecoder {
    tasks: Vec<Task>,
    nodes: Vec<Slot>,
}

fn check(index: u32, len: usize, pool: PoolKind) -> Result<(), DecodeError> {
    if (index as usize) < len {
        Ok(())
    } else {
        Err(DecodeError::OutOfBounds {
            pool,
            index,
            len: len as u32,
        })
    }
}

fn expr_task(ty: ValType) -> Task {
    match ty {
        ValType::I32 => Task::ExprI32,
        ValType::F32 => Task::ExprF32,
        ValType::F64 => Task::ExprF64,
    }
}

fn ret_task(ty: RetType) -> Task {
    match ty {
        RetType::I32 => Task::ExprI32,
        RetType::F32 => Task::ExprF32,
        RetType::F64 => Task::ExprF64,
        RetType::Void => Task::ExprVoid,
    }
}

impl<'a> FnCtx<'a> {
    fn local_type(&self, index: u32) -> Result<ValType, DecodeError> {
        check(index, self.locals.len(), PoolKind::Locals)?;
        Ok(self.locals[index as usize].ty)
    }

    fn global_type(&self, index: u32) -> Result<ValType, DecodeError> {
        check(index, self.globals.len(), PoolKind::Globals)?;
        Ok(self.globals[index as usize].ty)
    }

    fn signature(&self, id: SigId) -> Result<&'a Signature, DecodeError> {
        self.sigs.get(id.0 as usize).ok_or(DecodeError::OutOfBounds {
            pool: PoolKind::Signatures,
            index: id.0,
            len: self.sigs.len() as u32,
        })
    }

    fn decl_sig(&self, func: u32) -> Result<&'a Signature, DecodeError> {
        check(func, self.decls.len(), PoolKind::Declarations)?;
        self.signature(self.decls[func as usize].sig)
    }

    fn table_sig(&self, table: u32) -> Result<&'a Signature, DecodeError> {
        check(table, self.tables.len(), PoolKind::PointerTables)?;
        self.signature(self.tables[table as usize].sig)
    }

    fn import_sig(&self, entry: u32) -> Result<&'a Signature, DecodeError> {
        check(entry, self.import_sigs.len(), PoolKind::ImportSigs)?;
        self.signature(self.import_sigs[entry as usize].sig)
    }

    fn const_pool_len(&self, ty: ValType) -> usize {
        match ty {
            ValType::I32 => self.consts_i32_len,
            ValType::F32 => self.consts_f32_len,
            ValType::F64 => self.consts_f64_len,
        }
    }
}

/// Argument tasks for a call, with an optional leading extra child (the
/// element-index expression of an indirect call).
fn call_tasks(sig: &Signature, lead: Option<Task>) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(sig.args.len() + 1);
    if let Some(t) = lead {
        tasks.push(t);
    }
    tasks.extend(sig.args.iter().map(|&a| expr_task(a)));
    tasks
}

impl AstDecoder {
    pub(crate) fn new() -> Self {
        Self {
            tasks: vec![Task::StmtList],
            nodes: Vec::new(),
        }
    }

    /// Drives decoding until the body completes or the buffer runs dry.
    ///
    /// On suspension the cursor is rolled back to its last commit and the
    /// interrupted task stays on top of the task stack.
    pub(crate) fn drive(
        &mut self,
        cur: &mut ByteCursor,
        ctx: &FnCtx<'_>,
    ) -> Result<AstProgress, DecodeError> {
        loop {
            let Some(&task) = self.tasks.last() else {
                return self.take_root().map(AstProgress::Complete);
            };
            match self.run(task, cur, ctx) {
                Ok(()) => cur.advance(),
                Err(ReadError::NeedMore) => {
                    cur.reset();
                    return Ok(AstProgress::Suspended);
                }
                Err(ReadError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn take_root(&mut self) -> Result<StmtList, DecodeError> {
        debug_assert_eq!(self.nodes.len(), 1, "node stack must hold exactly the root");
        match self.nodes.pop() {
            Some(Slot::Root(stmts)) if self.nodes.is_empty() => Ok(StmtList::new(stmts)),
            _ => Err(DecodeError::Poisoned),
        }
    }

    fn run(&mut self, task: Task, cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<(), ReadError> {
        match task {
            Task::Pop => {
                self.tasks.pop();
                Ok(self.finish_node()?)
            }
            Task::StmtList => {
                let count = cur.read_varint_u32()?;
                self.tasks.pop();
                self.nodes.push(Slot::Root(Vec::with_capacity(count as usize)));
                for _ in 0..count {
                    self.tasks.push(Task::Stmt);
                }
                Ok(())
            }
            Task::SwitchCase => {
                let (operands, nested) = read_switch_case(cur)?;
                self.tasks.pop();
                self.append_to_switch(operands)?;
                for _ in 0..nested {
                    self.tasks.push(Task::Stmt);
                }
                Ok(())
            }
            Task::Stmt => {
                let (node, children) = read_stmt(cur, ctx)?;
                self.tasks.pop();
                Ok(self.emit(node, children)?)
            }
            Task::ExprI32 => {
                let (node, children) = read_i32(cur, ctx)?;
                self.tasks.pop();
                Ok(self.emit(node, children)?)
            }
            Task::ExprF32 => {
                let (node, children) = read_f32(cur, ctx)?;
                self.tasks.pop();
                Ok(self.emit(node, children)?)
            }
            Task::ExprF64 => {
                let (node, children) = read_f64(cur, ctx)?;
                self.tasks.pop();
                Ok(self.emit(node, children)?)
            }
            Task::ExprVoid => {
                let (node, children) = read_void(cur, ctx)?;
                self.tasks.pop();
                Ok(self.emit(node, children)?)
            }
        }
    }

    /// Appends a completed node to the current append-target; composites
    /// become the new append-target until their matching [`Task::Pop`].
    fn emit(&mut self, node: AstNode, children: Vec<Task>) -> Result<(), DecodeError> {
        if children.is_empty() {
            return self.append_node(node);
        }
        self.nodes.push(Slot::Node(node));
        self.tasks.push(Task::Pop);
        for &t in children.iter().rev() {
            self.tasks.push(t);
        }
        Ok(())
    }

    fn append_node(&mut self, node: AstNode) -> Result<(), DecodeError> {
        match self.nodes.last_mut() {
            Some(Slot::Root(list)) => list.push(node),
            Some(Slot::Node(parent)) => parent.operands.push(Operand::Node(node)),
            None => return Err(DecodeError::Poisoned),
        }
        Ok(())
    }

    fn finish_node(&mut self) -> Result<(), DecodeError> {
        match self.nodes.pop() {
            Some(Slot::Node(node)) => self.append_node(node),
            _ => Err(DecodeError::Poisoned),
        }
    }

    /// Switch cases write their shape marker, label and count straight into
    /// the enclosing `switch` node's operand list; only their nested
    /// statements go through the normal emit path.
    fn append_to_switch(&mut self, operands: Vec<Operand>) -> Result<(), DecodeError> {
        match self.nodes.last_mut() {
            Some(Slot::Node(switch)) => {
                switch.operands.extend(operands);
                Ok(())
            }
            _ => Err(DecodeError::Poisoned),
        }
    }
}

type NodeReads = (AstNode, Vec<Task>);

fn unknown(kind: Kind, opcode: u8) -> ReadError {
    ReadError::Fatal(DecodeError::UnknownOpcode { kind, opcode })
}

fn read_stmt(cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<NodeReads, ReadError> {
    let byte = cur.read_u8()?;
    if let Some((sel, imm)) = unpack_with_imm(byte) {
        let op = StmtOp::from_selector(sel).ok_or_else(|| unknown(Kind::Stmt, byte))?;
        let index = u32::from(imm);
        let (operand, ty) = match op {
            StmtOp::SetLoc => (Operand::Local(index), ctx.local_type(index)?),
            StmtOp::SetGlo => (Operand::Global(GlobalId(index)), ctx.global_type(index)?),
            _ => return Err(unknown(Kind::Stmt, byte)),
        };
        let mut node = AstNode::with_operands(AnyOp::Stmt(op), vec![operand]);
        node.with_imm = true;
        return Ok((node, vec![expr_task(ty)]));
    }

    let op = StmtOp::from_u8(byte).ok_or_else(|| unknown(Kind::Stmt, byte))?;
    let any = AnyOp::Stmt(op);
    Ok(match op {
        StmtOp::SetLoc => {
            let index = cur.read_varint_u32()?;
            let ty = ctx.local_type(index)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                vec![expr_task(ty)],
            )
        }
        StmtOp::SetGlo => {
            let index = cur.read_varint_u32()?;
            let ty = ctx.global_type(index)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                vec![expr_task(ty)],
            )
        }
        StmtOp::CallInt => read_call_int(cur, ctx, any)?,
        StmtOp::CallInd => read_call_ind(cur, ctx, any)?,
        StmtOp::CallImp => read_call_imp(cur, ctx, any)?,
        StmtOp::Ret => match ctx.ret.val() {
            None => (AstNode::new(any), Vec::new()),
            Some(ty) => (AstNode::new(any), vec![expr_task(ty)]),
        },
        StmtOp::Block => {
            let count = cur.read_varint_u32()?;
            (AstNode::new(any), vec![Task::Stmt; count as usize])
        }
        StmtOp::IfThen => (AstNode::new(any), vec![Task::ExprI32, Task::Stmt]),
        StmtOp::IfElse => (
            AstNode::new(any),
            vec![Task::ExprI32, Task::Stmt, Task::Stmt],
        ),
        StmtOp::While => (AstNode::new(any), vec![Task::ExprI32, Task::Stmt]),
        StmtOp::Do => (AstNode::new(any), vec![Task::Stmt, Task::ExprI32]),
        StmtOp::Label => (AstNode::new(any), vec![Task::Stmt]),
        StmtOp::Break | StmtOp::Continue => (AstNode::new(any), Vec::new()),
        StmtOp::BreakLabel | StmtOp::ContinueLabel => {
            let depth = cur.read_varint_u32()?;
            (
                AstNode::with_operands(any, vec![Operand::U32(depth)]),
                Vec::new(),
            )
        }
        StmtOp::Switch => {
            let count = cur.read_varint_u32()?;
            let mut children = Vec::with_capacity(count as usize + 1);
            children.push(Task::ExprI32);
            children.extend(core::iter::repeat_n(Task::SwitchCase, count as usize));
            (AstNode::new(any), children)
        }
    })
}

fn read_call_int(cur: &mut ByteCursor, ctx: &FnCtx<'_>, any: AnyOp) -> Result<NodeReads, ReadError> {
    let func = cur.read_varint_u32()?;
    let sig = ctx.decl_sig(func)?;
    Ok((
        AstNode::with_operands(any, vec![Operand::Func(FuncId(func))]),
        call_tasks(sig, None),
    ))
}

fn read_call_ind(cur: &mut ByteCursor, ctx: &FnCtx<'_>, any: AnyOp) -> Result<NodeReads, ReadError> {
    let table = cur.read_varint_u32()?;
    let sig = ctx.table_sig(table)?;
    Ok((
        AstNode::with_operands(any, vec![Operand::Table(TableId(table))]),
        call_tasks(sig, Some(Task::ExprI32)),
    ))
}

fn read_call_imp(cur: &mut ByteCursor, ctx: &FnCtx<'_>, any: AnyOp) -> Result<NodeReads, ReadError> {
    let entry = cur.read_varint_u32()?;
    let sig = ctx.import_sig(entry)?;
    Ok((
        AstNode::with_operands(any, vec![Operand::ImportSig(ImportSigId(entry))]),
        call_tasks(sig, None),
    ))
}

/// Packed `lit_pool` immediate: the 5-bit value is the pool index.
fn packed_pool(ctx: &FnCtx<'_>, ty: ValType, index: u32) -> Result<Operand, DecodeError> {
    let pool = match ty {
        ValType::I32 => PoolKind::ConstI32,
        ValType::F32 => PoolKind::ConstF32,
        ValType::F64 => PoolKind::ConstF64,
    };
    check(index, ctx.const_pool_len(ty), pool)?;
    Ok(Operand::Const(ty, index))
}

/// Packed `get_loc` immediate: the 5-bit value is the local index.
fn packed_local(ctx: &FnCtx<'_>, index: u32) -> Result<Operand, DecodeError> {
    check(index, ctx.locals.len(), PoolKind::Locals)?;
    Ok(Operand::Local(index))
}

fn read_i32(cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<NodeReads, ReadError> {
    let byte = cur.read_u8()?;
    if let Some((sel, imm)) = unpack_with_imm(byte) {
        let op = I32Op::from_selector(sel).ok_or_else(|| unknown(Kind::ExprI32, byte))?;
        let index = u32::from(imm);
        let operand = match op {
            I32Op::LitImm => Operand::U32(index),
            I32Op::LitPool => packed_pool(ctx, ValType::I32, index)?,
            I32Op::GetLoc => packed_local(ctx, index)?,
            _ => return Err(unknown(Kind::ExprI32, byte)),
        };
        let mut node = AstNode::with_operands(AnyOp::I32(op), vec![operand]);
        node.with_imm = true;
        return Ok((node, Vec::new()));
    }

    let op = I32Op::from_u8(byte).ok_or_else(|| unknown(Kind::ExprI32, byte))?;
    let any = AnyOp::I32(op);
    Ok(match op {
        I32Op::LitImm => {
            let v = cur.read_varint_u32()?;
            (AstNode::with_operands(any, vec![Operand::U32(v)]), Vec::new())
        }
        I32Op::LitPool => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.consts_i32_len, PoolKind::ConstI32)?;
            (
                AstNode::with_operands(any, vec![Operand::Const(ValType::I32, index)]),
                Vec::new(),
            )
        }
        I32Op::GetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                Vec::new(),
            )
        }
        I32Op::GetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                Vec::new(),
            )
        }
        I32Op::SetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                vec![Task::ExprI32],
            )
        }
        I32Op::SetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                vec![Task::ExprI32],
            )
        }
        I32Op::CallInt => read_call_int(cur, ctx, any)?,
        I32Op::CallInd => read_call_ind(cur, ctx, any)?,
        I32Op::CallImp => read_call_imp(cur, ctx, any)?,
        I32Op::Cond => (
            AstNode::new(any),
            vec![Task::ExprI32, Task::ExprI32, Task::ExprI32],
        ),
        I32Op::Comma => {
            let code = cur.read_u8()?;
            let left = RetType::from_u8(code)?;
            (AstNode::new(any), vec![ret_task(left), Task::ExprI32])
        }
        I32Op::FromF32 => (AstNode::new(any), vec![Task::ExprF32]),
        I32Op::FromF64 => (AstNode::new(any), vec![Task::ExprF64]),
        I32Op::Neg | I32Op::BitNot | I32Op::Clz | I32Op::LogicNot | I32Op::Abs => {
            (AstNode::new(any), vec![Task::ExprI32])
        }
        I32Op::Add
        | I32Op::Sub
        | I32Op::Mul
        | I32Op::SDiv
        | I32Op::UDiv
        | I32Op::SRem
        | I32Op::URem
        | I32Op::BitOr
        | I32Op::BitAnd
        | I32Op::BitXor
        | I32Op::Lsh
        | I32Op::ArithRsh
        | I32Op::LogicRsh
        | I32Op::SMin
        | I32Op::UMin
        | I32Op::SMax
        | I32Op::UMax
        | I32Op::EqI32
        | I32Op::NEqI32
        | I32Op::SLtI32
        | I32Op::SLeI32
        | I32Op::ULtI32
        | I32Op::ULeI32
        | I32Op::SGtI32
        | I32Op::SGeI32
        | I32Op::UGtI32
        | I32Op::UGeI32 => (AstNode::new(any), vec![Task::ExprI32, Task::ExprI32]),
        I32Op::EqF32
        | I32Op::NEqF32
        | I32Op::LtF32
        | I32Op::LeF32
        | I32Op::GtF32
        | I32Op::GeF32 => (AstNode::new(any), vec![Task::ExprF32, Task::ExprF32]),
        I32Op::EqF64
        | I32Op::NEqF64
        | I32Op::LtF64
        | I32Op::LeF64
        | I32Op::GtF64
        | I32Op::GeF64 => (AstNode::new(any), vec![Task::ExprF64, Task::ExprF64]),
    })
}

fn read_f32(cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<NodeReads, ReadError> {
    let byte = cur.read_u8()?;
    if let Some((sel, imm)) = unpack_with_imm(byte) {
        let op = F32Op::from_selector(sel).ok_or_else(|| unknown(Kind::ExprF32, byte))?;
        let index = u32::from(imm);
        let operand = match op {
            F32Op::LitPool => packed_pool(ctx, ValType::F32, index)?,
            F32Op::GetLoc => packed_local(ctx, index)?,
            _ => return Err(unknown(Kind::ExprF32, byte)),
        };
        let mut node = AstNode::with_operands(AnyOp::F32(op), vec![operand]);
        node.with_imm = true;
        return Ok((node, Vec::new()));
    }

    let op = F32Op::from_u8(byte).ok_or_else(|| unknown(Kind::ExprF32, byte))?;
    let any = AnyOp::F32(op);
    Ok(match op {
        F32Op::LitImm => {
            let v = cur.read_f32_le()?;
            (AstNode::with_operands(any, vec![Operand::F32(v)]), Vec::new())
        }
        F32Op::LitPool => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.consts_f32_len, PoolKind::ConstF32)?;
            (
                AstNode::with_operands(any, vec![Operand::Const(ValType::F32, index)]),
                Vec::new(),
            )
        }
        F32Op::GetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                Vec::new(),
            )
        }
        F32Op::GetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                Vec::new(),
            )
        }
        F32Op::SetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                vec![Task::ExprF32],
            )
        }
        F32Op::SetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                vec![Task::ExprF32],
            )
        }
        F32Op::CallInt => read_call_int(cur, ctx, any)?,
        F32Op::CallInd => read_call_ind(cur, ctx, any)?,
        F32Op::CallImp => read_call_imp(cur, ctx, any)?,
        F32Op::Cond => (
            AstNode::new(any),
            vec![Task::ExprI32, Task::ExprF32, Task::ExprF32],
        ),
        F32Op::Comma => {
            let code = cur.read_u8()?;
            let left = RetType::from_u8(code)?;
            (AstNode::new(any), vec![ret_task(left), Task::ExprF32])
        }
        F32Op::FromI32 => (AstNode::new(any), vec![Task::ExprI32]),
        F32Op::FromF64 => (AstNode::new(any), vec![Task::ExprF64]),
        F32Op::Neg | F32Op::Abs | F32Op::Ceil | F32Op::Floor | F32Op::Sqrt => {
            (AstNode::new(any), vec![Task::ExprF32])
        }
        F32Op::Add | F32Op::Sub | F32Op::Mul | F32Op::Div => {
            (AstNode::new(any), vec![Task::ExprF32, Task::ExprF32])
        }
    })
}

fn read_f64(cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<NodeReads, ReadError> {
    let byte = cur.read_u8()?;
    if let Some((sel, imm)) = unpack_with_imm(byte) {
        let op = F64Op::from_selector(sel).ok_or_else(|| unknown(Kind::ExprF64, byte))?;
        let index = u32::from(imm);
        let operand = match op {
            F64Op::LitPool => packed_pool(ctx, ValType::F64, index)?,
            F64Op::GetLoc => packed_local(ctx, index)?,
            _ => return Err(unknown(Kind::ExprF64, byte)),
        };
        let mut node = AstNode::with_operands(AnyOp::F64(op), vec![operand]);
        node.with_imm = true;
        return Ok((node, Vec::new()));
    }

    let op = F64Op::from_u8(byte).ok_or_else(|| unknown(Kind::ExprF64, byte))?;
    let any = AnyOp::F64(op);
    Ok(match op {
        F64Op::LitImm => {
            let v = cur.read_f64_le()?;
            (AstNode::with_operands(any, vec![Operand::F64(v)]), Vec::new())
        }
        F64Op::LitPool => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.consts_f64_len, PoolKind::ConstF64)?;
            (
                AstNode::with_operands(any, vec![Operand::Const(ValType::F64, index)]),
                Vec::new(),
            )
        }
        F64Op::GetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                Vec::new(),
            )
        }
        F64Op::GetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                Vec::new(),
            )
        }
        F64Op::SetLoc => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.locals.len(), PoolKind::Locals)?;
            (
                AstNode::with_operands(any, vec![Operand::Local(index)]),
                vec![Task::ExprF64],
            )
        }
        F64Op::SetGlo => {
            let index = cur.read_varint_u32()?;
            check(index, ctx.globals.len(), PoolKind::Globals)?;
            (
                AstNode::with_operands(any, vec![Operand::Global(GlobalId(index))]),
                vec![Task::ExprF64],
            )
        }
        F64Op::CallInt => read_call_int(cur, ctx, any)?,
        F64Op::CallInd => read_call_ind(cur, ctx, any)?,
        F64Op::CallImp => read_call_imp(cur, ctx, any)?,
        F64Op::Cond => (
            AstNode::new(any),
            vec![Task::ExprI32, Task::ExprF64, Task::ExprF64],
        ),
        F64Op::Comma => {
            let code = cur.read_u8()?;
            let left = RetType::from_u8(code)?;
            (AstNode::new(any), vec![ret_task(left), Task::ExprF64])
        }
        F64Op::FromI32 => (AstNode::new(any), vec![Task::ExprI32]),
        F64Op::FromF32 => (AstNode::new(any), vec![Task::ExprF32]),
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
        | F64Op::Ln => (AstNode::new(any), vec![Task::ExprF64]),
        F64Op::Add
        | F64Op::Sub
        | F64Op::Mul
        | F64Op::Div
        | F64Op::Rem
        | F64Op::Min
        | F64Op::Max
        | F64Op::ATan2
        | F64Op::Pow => (AstNode::new(any), vec![Task::ExprF64, Task::ExprF64]),
    })
}

fn read_void(cur: &mut ByteCursor, ctx: &FnCtx<'_>) -> Result<NodeReads, ReadError> {
    // Void opcodes have no with-immediate forms: the byte is always plain,
    // so a set top bit simply fails the table lookup.
    let byte = cur.read_u8()?;
    let op = VoidOp::from_u8(byte).ok_or_else(|| unknown(Kind::ExprVoid, byte))?;
    let any = AnyOp::Void(op);
    match op {
        VoidOp::CallInt => read_call_int(cur, ctx, any),
        VoidOp::CallInd => read_call_ind(cur, ctx, any),
        VoidOp::CallImp => read_call_imp(cur, ctx, any),
    }
}

/// Reads one switch-case header. Returns the operands to splice into the
/// enclosing `switch` node and the number of nested statements to decode.
fn read_switch_case(cur: &mut ByteCursor) -> Result<(Vec<Operand>, u32), ReadError> {
    let tag = cur.read_u8()?;
    let op = SwitchCaseOp::from_u8(tag).ok_or(DecodeError::BadSwitchCase { tag })?;
    Ok(match op {
        SwitchCaseOp::Case0 => {
            let label = cur.read_varint_i32()?;
            (vec![Operand::Case(op), Operand::I32(label)], 0)
        }
        SwitchCaseOp::Case1 => {
            let label = cur.read_varint_i32()?;
            (vec![Operand::Case(op), Operand::I32(label)], 1)
        }
        SwitchCaseOp::CaseN => {
            let label = cur.read_varint_i32()?;
            let count = cur.read_varint_u32()?;
            (
                vec![
                    Operand::Case(op),
                    Operand::I32(label),
                    Operand::U32(count),
                ],
                count,
            )
        }
        SwitchCaseOp::Default0 => (vec![Operand::Case(op)], 0),
        SwitchCaseOp::Default1 => (vec![Operand::Case(op)], 1),
        SwitchCaseOp::DefaultN => {
            let count = cur.read_varint_u32()?;
            (vec![Operand::Case(op), Operand::U32(count)], count)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::pack_with_imm;

    fn void_ctx() -> FnCtx<'static> {
        FnCtx {
            sigs: &[],
            import_sigs: &[],
            globals: &[],
            decls: &[],
            tables: &[],
            locals: &[],
            consts_i32_len: 0,
            consts_f32_len: 0,
            consts_f64_len: 0,
            ret: RetType::Void,
        }
    }

    fn drive_all(bytes: &[u8], ctx: &FnCtx<'_>) -> Result<StmtList, DecodeError> {
        let mut cur = ByteCursor::new();
        cur.push(bytes);
        let mut d = AstDecoder::new();
        match d.drive(&mut cur, ctx)? {
            AstProgress::Complete(list) => Ok(list),
            AstProgress::Suspended => panic!("decoder suspended on complete input"),
        }
    }

    #[test]
    fn empty_body_decodes() {
        let list = drive_all(&[0x00], &void_ctx()).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn nested_block_decodes_without_recursion_state_loss() {
        // block { block { break } break }
        let bytes = [
            0x01,
            StmtOp::Block.byte(),
            0x02,
            StmtOp::Block.byte(),
            0x01,
            StmtOp::Break.byte(),
            StmtOp::Break.byte(),
        ];
        let list = drive_all(&bytes, &void_ctx()).unwrap();
        assert_eq!(list.len(), 1);
        let outer = &list.stmts[0];
        assert_eq!(outer.op, AnyOp::Stmt(StmtOp::Block));
        assert_eq!(outer.operands.len(), 2);
        let inner = outer.operands[0].node().unwrap();
        assert_eq!(inner.op, AnyOp::Stmt(StmtOp::Block));
        assert_eq!(inner.operands.len(), 1);
    }

    #[test]
    fn suspension_mid_expression_resumes_exactly() {
        let locals = [Local { ty: ValType::I32 }, Local { ty: ValType::I32 }];
        let ctx = FnCtx {
            locals: &locals,
            ret: RetType::I32,
            ..void_ctx()
        };
        // ret (add (get_loc 0) (get_loc 1)), one byte at a time.
        let bytes = [
            0x01,
            StmtOp::Ret.byte(),
            I32Op::Add.byte(),
            pack_with_imm(2, 0),
            pack_with_imm(2, 1),
        ];
        let mut cur = ByteCursor::new();
        let mut d = AstDecoder::new();
        let mut result = None;
        for &b in &bytes {
            cur.push(&[b]);
            match d.drive(&mut cur, &ctx).unwrap() {
                AstProgress::Complete(list) => {
                    result = Some(list);
                }
                AstProgress::Suspended => {}
            }
        }
        let list = result.expect("body should complete on the final byte");
        let ret = &list.stmts[0];
        assert_eq!(ret.op, AnyOp::Stmt(StmtOp::Ret));
        let add = ret.operands[0].node().unwrap();
        assert_eq!(add.op, AnyOp::I32(I32Op::Add));
        assert_eq!(add.operands[0].node().unwrap().operands, [Operand::Local(0)]);
        assert_eq!(add.operands[1].node().unwrap().operands, [Operand::Local(1)]);
        assert!(add.operands[0].node().unwrap().with_imm);
    }

    #[test]
    fn unknown_opcode_names_kind_and_byte() {
        let err = drive_all(&[0x01, 0x11], &void_ctx()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownOpcode {
                kind: Kind::Stmt,
                opcode: 0x11
            }
        );
    }

    #[test]
    fn packed_local_out_of_bounds_is_fatal() {
        let locals = [Local { ty: ValType::I32 }];
        let ctx = FnCtx {
            locals: &locals,
            ret: RetType::I32,
            ..void_ctx()
        };
        // ret (get_loc 1) with only one local.
        let bytes = [0x01, StmtOp::Ret.byte(), pack_with_imm(2, 1)];
        let err = drive_all(&bytes, &ctx).unwrap_err();
        assert_eq!(
            err,
            DecodeError::OutOfBounds {
                pool: PoolKind::Locals,
                index: 1,
                len: 1
            }
        );
    }

    #[test]
    fn comma_left_type_byte_drives_child_kind() {
        let sigs = [Signature {
            ret: RetType::Void,
            args: Vec::new(),
        }];
        let decls = [FuncDecl { sig: SigId(0) }];
        let ctx = FnCtx {
            sigs: &sigs,
            decls: &decls,
            ret: RetType::I32,
            ..void_ctx()
        };
        // ret (comma<void> (void.call_int 0) (lit_imm 7))
        let bytes = [
            0x01,
            StmtOp::Ret.byte(),
            I32Op::Comma.byte(),
            RetType::Void.code(),
            VoidOp::CallInt.byte(),
            0x00,
            pack_with_imm(0, 7),
        ];
        let list = drive_all(&bytes, &ctx).unwrap();
        let comma = list.stmts[0].operands[0].node().unwrap();
        assert_eq!(comma.op, AnyOp::I32(I32Op::Comma));
        assert_eq!(comma.operands.len(), 2);
        assert_eq!(
            comma.operands[0].node().unwrap().op,
            AnyOp::Void(VoidOp::CallInt)
        );
        assert_eq!(comma.operands[1].node().unwrap().operands, [Operand::U32(7)]);
    }

    #[test]
    fn switch_cases_append_flat_into_the_switch_node() {
        let ctx = void_ctx();
        // switch (lit_imm 0) { case 1: break; default: }  (default_n with 0)
        let bytes = [
            0x01,
            StmtOp::Switch.byte(),
            0x02,
            pack_with_imm(0, 0),
            SwitchCaseOp::Case1.byte(),
            0x01,
            StmtOp::Break.byte(),
            SwitchCaseOp::DefaultN.byte(),
            0x00,
        ];
        let list = drive_all(&bytes, &ctx).unwrap();
        let switch = &list.stmts[0];
        assert_eq!(switch.op, AnyOp::Stmt(StmtOp::Switch));
        assert_eq!(switch.operands.len(), 6);
        assert!(matches!(switch.operands[0], Operand::Node(_)));
        assert_eq!(switch.operands[1], Operand::Case(SwitchCaseOp::Case1));
        assert_eq!(switch.operands[2], Operand::I32(1));
        assert_eq!(
            switch.operands[3].node().unwrap().op,
            AnyOp::Stmt(StmtOp::Break)
        );
        assert_eq!(switch.operands[4], Operand::Case(SwitchCaseOp::DefaultN));
        assert_eq!(switch.operands[5], Operand::U32(0));
    }

    #[test]
    fn bad_switch_case_tag_is_fatal() {
        let bytes = [0x01, StmtOp::Switch.byte(), 0x01, pack_with_imm(0, 0), 0x06];
        let err = drive_all(&bytes, &void_ctx()).unwrap_err();
        assert_eq!(err, DecodeError::BadSwitchCase { tag: 6 });
    }
}
