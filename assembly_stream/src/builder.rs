// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Programmatic module construction.
//!
//! [`AssemblyBuilder`] applies the same bounds checks the decoder performs,
//! at call time, so a successfully built [`Assembly`] encodes cleanly. The
//! [`node`] module provides AST constructors that pick the packed
//! opcode-with-immediate form automatically when an index or literal fits.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::ast::StmtList;
use crate::module::{
    Assembly, Export, ExportEntry, FuncDecl, FuncDef, FuncId, Global, GlobalId, Import, ImportId,
    ImportSig, ImportSigId, Local, PointerTable, PoolKind, RetType, SigId, Signature, TableId,
    ValType,
};

/// A builder error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// A cross-reference points outside its pool.
    OutOfBounds {
        /// The referenced pool.
        pool: PoolKind,
        /// The offending index.
        index: u32,
        /// The pool length at the time of the reference.
        len: u32,
    },
    /// A global was added out of run order (zero-initialized i32/f32/f64,
    /// then imported i32/f32/f64).
    GlobalOutOfOrder,
    /// The function already has a definition.
    DuplicateDefinition {
        /// The function.
        func: FuncId,
    },
    /// A declared function was never defined.
    MissingDefinition {
        /// The function.
        func: FuncId,
    },
    /// No export descriptor was set.
    MissingExport,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { pool, index, len } => {
                write!(f, "{} index {index} out of bounds (len {len})", pool.name())
            }
            Self::GlobalOutOfOrder => write!(f, "globals must be added in run order"),
            Self::DuplicateDefinition { func } => {
                write!(f, "function {} is already defined", func.0)
            }
            Self::MissingDefinition { func } => write!(f, "function {} has no body", func.0),
            Self::MissingExport => write!(f, "module has no export descriptor"),
        }
    }
}

impl core::error::Error for BuildError {}

/// Builds an [`Assembly`] pool by pool.
#[derive(Debug, Default)]
pub struct AssemblyBuilder {
    consts_i32: Vec<u32>,
    consts_f32: Vec<f32>,
    consts_f64: Vec<f64>,
    signatures: Vec<Signature>,
    imports: Vec<Import>,
    import_sigs: Vec<ImportSig>,
    globals: Vec<Global>,
    global_phase: u8,
    declarations: Vec<FuncDecl>,
    definitions: Vec<Option<FuncDef>>,
    pointer_tables: Vec<PointerTable>,
    export: Option<Export>,
}

fn check(index: u32, len: usize, pool: PoolKind) -> Result<(), BuildError> {
    if (index as usize) < len {
        Ok(())
    } else {
        Err(BuildError::OutOfBounds {
            pool,
            index,
            len: len as u32,
        })
    }
}

impl AssemblyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an i32 constant; returns its pool index.
    pub fn const_i32(&mut self, value: u32) -> u32 {
        self.consts_i32.push(value);
        self.consts_i32.len() as u32 - 1
    }

    /// Adds an f32 constant; returns its pool index.
    pub fn const_f32(&mut self, value: f32) -> u32 {
        self.consts_f32.push(value);
        self.consts_f32.len() as u32 - 1
    }

    /// Adds an f64 constant; returns its pool index.
    pub fn const_f64(&mut self, value: f64) -> u32 {
        self.consts_f64.push(value);
        self.consts_f64.len() as u32 - 1
    }

    /// Adds a signature.
    pub fn signature(&mut self, ret: RetType, args: Vec<ValType>) -> SigId {
        self.signatures.push(Signature { ret, args });
        SigId(self.signatures.len() as u32 - 1)
    }

    /// Adds an import callable at `sigs`, flattening one
    /// `(import, signature)` entry per element.
    pub fn import(&mut self, name: &str, sigs: &[SigId]) -> Result<ImportId, BuildError> {
        for sig in sigs {
            check(sig.0, self.signatures.len(), PoolKind::Signatures)?;
        }
        let id = ImportId(self.imports.len() as u32);
        for &sig in sigs {
            self.import_sigs.push(ImportSig { import: id, sig });
        }
        self.imports.push(Import {
            name: String::from(name),
            sigs: sigs.to_vec(),
        });
        Ok(id)
    }

    /// The flattened entry for the `nth` signature of `import`.
    pub fn import_sig(&self, import: ImportId, nth: usize) -> Option<ImportSigId> {
        self.import_sigs
            .iter()
            .enumerate()
            .filter(|(_, e)| e.import == import)
            .nth(nth)
            .map(|(i, _)| ImportSigId(i as u32))
    }

    fn push_global(&mut self, ty: ValType, import_name: Option<String>) -> Result<GlobalId, BuildError> {
        let phase = match (import_name.is_some(), ty) {
            (false, ValType::I32) => 0,
            (false, ValType::F32) => 1,
            (false, ValType::F64) => 2,
            (true, ValType::I32) => 3,
            (true, ValType::F32) => 4,
            (true, ValType::F64) => 5,
        };
        if phase < self.global_phase {
            return Err(BuildError::GlobalOutOfOrder);
        }
        self.global_phase = phase;
        self.globals.push(Global { ty, import_name });
        Ok(GlobalId(self.globals.len() as u32 - 1))
    }

    /// Adds a zero-initialized global. Globals must be added in wire run
    /// order (zero-initialized i32/f32/f64, then imported i32/f32/f64).
    pub fn zero_global(&mut self, ty: ValType) -> Result<GlobalId, BuildError> {
        self.push_global(ty, None)
    }

    /// Adds an imported global. See [`AssemblyBuilder::zero_global`] for
    /// ordering requirements.
    pub fn import_global(&mut self, ty: ValType, name: &str) -> Result<GlobalId, BuildError> {
        self.push_global(ty, Some(String::from(name)))
    }

    /// Declares a function with the given signature.
    pub fn declare(&mut self, sig: SigId) -> Result<FuncId, BuildError> {
        check(sig.0, self.signatures.len(), PoolKind::Signatures)?;
        self.declarations.push(FuncDecl { sig });
        self.definitions.push(None);
        Ok(FuncId(self.declarations.len() as u32 - 1))
    }

    /// Attaches a body to a declared function. Locals are the signature's
    /// arguments followed by the requested extra i32, f32 and f64 slots.
    pub fn define(
        &mut self,
        func: FuncId,
        extra_i32: u32,
        extra_f32: u32,
        extra_f64: u32,
        body: StmtList,
    ) -> Result<(), BuildError> {
        check(func.0, self.declarations.len(), PoolKind::Declarations)?;
        let slot = &mut self.definitions[func.0 as usize];
        if slot.is_some() {
            return Err(BuildError::DuplicateDefinition { func });
        }
        let sig = &self.signatures[self.declarations[func.0 as usize].sig.0 as usize];
        let mut locals =
            Vec::with_capacity(sig.args.len() + (extra_i32 + extra_f32 + extra_f64) as usize);
        locals.extend(sig.args.iter().map(|&ty| Local { ty }));
        for (ty, n) in [
            (ValType::I32, extra_i32),
            (ValType::F32, extra_f32),
            (ValType::F64, extra_f64),
        ] {
            for _ in 0..n {
                locals.push(Local { ty });
            }
        }
        *slot = Some(FuncDef {
            locals,
            body_offset: 0,
            body_len: 0,
            body,
        });
        Ok(())
    }

    /// Adds a pointer table.
    pub fn pointer_table(&mut self, sig: SigId, elems: &[FuncId]) -> Result<TableId, BuildError> {
        check(sig.0, self.signatures.len(), PoolKind::Signatures)?;
        for elem in elems {
            check(elem.0, self.declarations.len(), PoolKind::Declarations)?;
        }
        self.pointer_tables.push(PointerTable {
            sig,
            elems: elems.to_vec(),
        });
        Ok(TableId(self.pointer_tables.len() as u32 - 1))
    }

    /// Sets a default export.
    pub fn export_default(&mut self, func: FuncId) -> Result<(), BuildError> {
        check(func.0, self.declarations.len(), PoolKind::Declarations)?;
        self.export = Some(Export::Default(func));
        Ok(())
    }

    /// Sets a record export.
    pub fn export_record(&mut self, entries: &[(&str, FuncId)]) -> Result<(), BuildError> {
        for (_, func) in entries {
            check(func.0, self.declarations.len(), PoolKind::Declarations)?;
        }
        self.export = Some(Export::Record(
            entries
                .iter()
                .map(|&(name, func)| ExportEntry {
                    name: String::from(name),
                    func,
                })
                .collect(),
        ));
        Ok(())
    }

    /// Finishes the build. Every declared function must be defined and an
    /// export descriptor must be set.
    pub fn build(self) -> Result<Assembly, BuildError> {
        let Some(export) = self.export else {
            return Err(BuildError::MissingExport);
        };
        let mut definitions = Vec::with_capacity(self.definitions.len());
        for (i, def) in self.definitions.into_iter().enumerate() {
            match def {
                Some(d) => definitions.push(d),
                None => {
                    return Err(BuildError::MissingDefinition {
                        func: FuncId(i as u32),
                    });
                }
            }
        }
        Ok(Assembly {
            consts_i32: self.consts_i32,
            consts_f32: self.consts_f32,
            consts_f64: self.consts_f64,
            signatures: self.signatures,
            imports: self.imports,
            import_sigs: self.import_sigs,
            globals: self.globals,
            declarations: self.declarations,
            definitions,
            pointer_tables: self.pointer_tables,
            export,
            declared_size: 0,
        })
    }
}

/// AST node constructors.
///
/// Constructors that have a packed with-immediate form set the node's
/// `with_imm` flag when the leading index or literal fits in 5 bits, so
/// built modules encode in the compact form the decoder would round-trip.
pub mod node {
    use alloc::vec;
    use alloc::vec::Vec;

    use crate::ast::{AstNode, Operand, StmtList};
    use crate::format::IMM_LIMIT;
    use crate::module::{FuncId, GlobalId, ImportSigId, TableId, ValType};
    use crate::opcode::{AnyOp, F32Op, F64Op, I32Op, StmtOp, SwitchCaseOp, VoidOp};

    /// A call target: internal function, import entry, or pointer-table
    /// element (with its dynamically computed i32 element index).
    pub enum Callee {
        /// Direct call of a declared function.
        Int(FuncId),
        /// Call of a flattened import-signature entry.
        Imp(ImportSigId),
        /// Indirect call through a pointer table.
        Ind(TableId, AstNode),
    }

    /// One arm of a `switch` statement.
    pub enum SwitchArm {
        /// `case label:` with no statement.
        Case0(i32),
        /// `case label:` with one statement.
        Case1(i32, AstNode),
        /// `case label:` with any number of statements.
        CaseN(i32, Vec<AstNode>),
        /// `default:` with no statement.
        Default0,
        /// `default:` with one statement.
        Default1(AstNode),
        /// `default:` with any number of statements.
        DefaultN(Vec<AstNode>),
    }

    fn leaf(op: AnyOp, operands: Vec<Operand>) -> AstNode {
        AstNode::with_operands(op, operands)
    }

    fn packed(mut node: AstNode, index: u32) -> AstNode {
        node.with_imm = index < IMM_LIMIT;
        node
    }

    /// A statement list (function body).
    #[must_use]
    pub fn stmts(list: Vec<AstNode>) -> StmtList {
        StmtList::new(list)
    }

    /// `ret;` for void functions.
    #[must_use]
    pub fn ret_void() -> AstNode {
        AstNode::new(AnyOp::Stmt(StmtOp::Ret))
    }

    /// `ret value;`.
    #[must_use]
    pub fn ret(value: AstNode) -> AstNode {
        leaf(AnyOp::Stmt(StmtOp::Ret), vec![Operand::Node(value)])
    }

    /// A statement block.
    #[must_use]
    pub fn block(body: Vec<AstNode>) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::Block),
            body.into_iter().map(Operand::Node).collect(),
        )
    }

    /// `if (cond) then`.
    #[must_use]
    pub fn if_then(cond: AstNode, then: AstNode) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::IfThen),
            vec![Operand::Node(cond), Operand::Node(then)],
        )
    }

    /// `if (cond) then else other`.
    #[must_use]
    pub fn if_else(cond: AstNode, then: AstNode, other: AstNode) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::IfElse),
            vec![
                Operand::Node(cond),
                Operand::Node(then),
                Operand::Node(other),
            ],
        )
    }

    /// `while (cond) body`.
    #[must_use]
    pub fn while_loop(cond: AstNode, body: AstNode) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::While),
            vec![Operand::Node(cond), Operand::Node(body)],
        )
    }

    /// `do body while (cond)`.
    #[must_use]
    pub fn do_loop(body: AstNode, cond: AstNode) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::Do),
            vec![Operand::Node(body), Operand::Node(cond)],
        )
    }

    /// A labeled statement.
    #[must_use]
    pub fn label(body: AstNode) -> AstNode {
        leaf(AnyOp::Stmt(StmtOp::Label), vec![Operand::Node(body)])
    }

    /// `break;`
    #[must_use]
    pub fn brk() -> AstNode {
        AstNode::new(AnyOp::Stmt(StmtOp::Break))
    }

    /// `break label;`
    #[must_use]
    pub fn brk_label(depth: u32) -> AstNode {
        leaf(AnyOp::Stmt(StmtOp::BreakLabel), vec![Operand::U32(depth)])
    }

    /// `continue;`
    #[must_use]
    pub fn cont() -> AstNode {
        AstNode::new(AnyOp::Stmt(StmtOp::Continue))
    }

    /// `continue label;`
    #[must_use]
    pub fn cont_label(depth: u32) -> AstNode {
        leaf(
            AnyOp::Stmt(StmtOp::ContinueLabel),
            vec![Operand::U32(depth)],
        )
    }

    /// `switch (cond) { arms }`.
    #[must_use]
    pub fn switch(cond: AstNode, arms: Vec<SwitchArm>) -> AstNode {
        let mut operands = vec![Operand::Node(cond)];
        for arm in arms {
            match arm {
                SwitchArm::Case0(l) => {
                    operands.push(Operand::Case(SwitchCaseOp::Case0));
                    operands.push(Operand::I32(l));
                }
                SwitchArm::Case1(l, s) => {
                    operands.push(Operand::Case(SwitchCaseOp::Case1));
                    operands.push(Operand::I32(l));
                    operands.push(Operand::Node(s));
                }
                SwitchArm::CaseN(l, body) => {
                    operands.push(Operand::Case(SwitchCaseOp::CaseN));
                    operands.push(Operand::I32(l));
                    operands.push(Operand::U32(body.len() as u32));
                    operands.extend(body.into_iter().map(Operand::Node));
                }
                SwitchArm::Default0 => {
                    operands.push(Operand::Case(SwitchCaseOp::Default0));
                }
                SwitchArm::Default1(s) => {
                    operands.push(Operand::Case(SwitchCaseOp::Default1));
                    operands.push(Operand::Node(s));
                }
                SwitchArm::DefaultN(body) => {
                    operands.push(Operand::Case(SwitchCaseOp::DefaultN));
                    operands.push(Operand::U32(body.len() as u32));
                    operands.extend(body.into_iter().map(Operand::Node));
                }
            }
        }
        leaf(AnyOp::Stmt(StmtOp::Switch), operands)
    }

    /// `local = value;` as a statement.
    #[must_use]
    pub fn set_loc(index: u32, value: AstNode) -> AstNode {
        packed(
            leaf(
                AnyOp::Stmt(StmtOp::SetLoc),
                vec![Operand::Local(index), Operand::Node(value)],
            ),
            index,
        )
    }

    /// `global = value;` as a statement.
    #[must_use]
    pub fn set_glo(global: GlobalId, value: AstNode) -> AstNode {
        packed(
            leaf(
                AnyOp::Stmt(StmtOp::SetGlo),
                vec![Operand::Global(global), Operand::Node(value)],
            ),
            global.0,
        )
    }

    fn call(op: AnyOp, callee: Callee, args: Vec<AstNode>) -> AstNode {
        let mut operands = Vec::with_capacity(args.len() + 2);
        match callee {
            Callee::Int(func) => operands.push(Operand::Func(func)),
            Callee::Imp(entry) => operands.push(Operand::ImportSig(entry)),
            Callee::Ind(table, elem) => {
                operands.push(Operand::Table(table));
                operands.push(Operand::Node(elem));
            }
        }
        operands.extend(args.into_iter().map(Operand::Node));
        leaf(op, operands)
    }

    /// A call statement (result discarded).
    #[must_use]
    pub fn call_stmt(callee: Callee, args: Vec<AstNode>) -> AstNode {
        let op = match &callee {
            Callee::Int(_) => StmtOp::CallInt,
            Callee::Imp(_) => StmtOp::CallImp,
            Callee::Ind(..) => StmtOp::CallInd,
        };
        call(AnyOp::Stmt(op), callee, args)
    }

    /// An i32-valued call expression.
    #[must_use]
    pub fn call_i32(callee: Callee, args: Vec<AstNode>) -> AstNode {
        let op = match &callee {
            Callee::Int(_) => I32Op::CallInt,
            Callee::Imp(_) => I32Op::CallImp,
            Callee::Ind(..) => I32Op::CallInd,
        };
        call(AnyOp::I32(op), callee, args)
    }

    /// An f32-valued call expression.
    #[must_use]
    pub fn call_f32(callee: Callee, args: Vec<AstNode>) -> AstNode {
        let op = match &callee {
            Callee::Int(_) => F32Op::CallInt,
            Callee::Imp(_) => F32Op::CallImp,
            Callee::Ind(..) => F32Op::CallInd,
        };
        call(AnyOp::F32(op), callee, args)
    }

    /// An f64-valued call expression.
    #[must_use]
    pub fn call_f64(callee: Callee, args: Vec<AstNode>) -> AstNode {
        let op = match &callee {
            Callee::Int(_) => F64Op::CallInt,
            Callee::Imp(_) => F64Op::CallImp,
            Callee::Ind(..) => F64Op::CallInd,
        };
        call(AnyOp::F64(op), callee, args)
    }

    /// A void call in expression position (e.g. the left side of a comma).
    #[must_use]
    pub fn call_void(callee: Callee, args: Vec<AstNode>) -> AstNode {
        let op = match &callee {
            Callee::Int(_) => VoidOp::CallInt,
            Callee::Imp(_) => VoidOp::CallImp,
            Callee::Ind(..) => VoidOp::CallInd,
        };
        call(AnyOp::Void(op), callee, args)
    }

    /// An i32 literal.
    #[must_use]
    pub fn i32_lit(value: u32) -> AstNode {
        packed(
            leaf(AnyOp::I32(I32Op::LitImm), vec![Operand::U32(value)]),
            value,
        )
    }

    /// An i32 constant-pool reference.
    #[must_use]
    pub fn i32_pool(index: u32) -> AstNode {
        packed(
            leaf(
                AnyOp::I32(I32Op::LitPool),
                vec![Operand::Const(ValType::I32, index)],
            ),
            index,
        )
    }

    /// An i32 local read.
    #[must_use]
    pub fn i32_get_loc(index: u32) -> AstNode {
        packed(
            leaf(AnyOp::I32(I32Op::GetLoc), vec![Operand::Local(index)]),
            index,
        )
    }

    /// An i32 global read.
    #[must_use]
    pub fn i32_get_glo(global: GlobalId) -> AstNode {
        leaf(AnyOp::I32(I32Op::GetGlo), vec![Operand::Global(global)])
    }

    /// An i32 assignment expression (`local = value`, yields the value).
    #[must_use]
    pub fn i32_set_loc(index: u32, value: AstNode) -> AstNode {
        leaf(
            AnyOp::I32(I32Op::SetLoc),
            vec![Operand::Local(index), Operand::Node(value)],
        )
    }

    /// An i32 unary operation.
    #[must_use]
    pub fn i32_unary(op: I32Op, a: AstNode) -> AstNode {
        leaf(AnyOp::I32(op), vec![Operand::Node(a)])
    }

    /// An i32 binary operation (arithmetic, bitwise or comparison).
    #[must_use]
    pub fn i32_binary(op: I32Op, a: AstNode, b: AstNode) -> AstNode {
        leaf(AnyOp::I32(op), vec![Operand::Node(a), Operand::Node(b)])
    }

    /// An i32 conditional expression (`cond ? a : b`).
    #[must_use]
    pub fn i32_cond(cond: AstNode, a: AstNode, b: AstNode) -> AstNode {
        leaf(
            AnyOp::I32(I32Op::Cond),
            vec![Operand::Node(cond), Operand::Node(a), Operand::Node(b)],
        )
    }

    /// An i32 comma expression (evaluate `left`, yield `right`).
    #[must_use]
    pub fn i32_comma(left: AstNode, right: AstNode) -> AstNode {
        leaf(
            AnyOp::I32(I32Op::Comma),
            vec![Operand::Node(left), Operand::Node(right)],
        )
    }

    /// An f32 literal.
    #[must_use]
    pub fn f32_lit(value: f32) -> AstNode {
        leaf(AnyOp::F32(F32Op::LitImm), vec![Operand::F32(value)])
    }

    /// An f32 constant-pool reference.
    #[must_use]
    pub fn f32_pool(index: u32) -> AstNode {
        packed(
            leaf(
                AnyOp::F32(F32Op::LitPool),
                vec![Operand::Const(ValType::F32, index)],
            ),
            index,
        )
    }

    /// An f32 local read.
    #[must_use]
    pub fn f32_get_loc(index: u32) -> AstNode {
        packed(
            leaf(AnyOp::F32(F32Op::GetLoc), vec![Operand::Local(index)]),
            index,
        )
    }

    /// An f32 unary operation.
    #[must_use]
    pub fn f32_unary(op: F32Op, a: AstNode) -> AstNode {
        leaf(AnyOp::F32(op), vec![Operand::Node(a)])
    }

    /// An f32 binary operation.
    #[must_use]
    pub fn f32_binary(op: F32Op, a: AstNode, b: AstNode) -> AstNode {
        leaf(AnyOp::F32(op), vec![Operand::Node(a), Operand::Node(b)])
    }

    /// An f64 literal.
    #[must_use]
    pub fn f64_lit(value: f64) -> AstNode {
        leaf(AnyOp::F64(F64Op::LitImm), vec![Operand::F64(value)])
    }

    /// An f64 constant-pool reference.
    #[must_use]
    pub fn f64_pool(index: u32) -> AstNode {
        packed(
            leaf(
                AnyOp::F64(F64Op::LitPool),
                vec![Operand::Const(ValType::F64, index)],
            ),
            index,
        )
    }

    /// An f64 local read.
    #[must_use]
    pub fn f64_get_loc(index: u32) -> AstNode {
        packed(
            leaf(AnyOp::F64(F64Op::GetLoc), vec![Operand::Local(index)]),
            index,
        )
    }

    /// An f64 unary operation.
    #[must_use]
    pub fn f64_unary(op: F64Op, a: AstNode) -> AstNode {
        leaf(AnyOp::F64(op), vec![Operand::Node(a)])
    }

    /// An f64 binary operation.
    #[must_use]
    pub fn f64_binary(op: F64Op, a: AstNode, b: AstNode) -> AstNode {
        leaf(AnyOp::F64(op), vec![Operand::Node(a), Operand::Node(b)])
    }
}
