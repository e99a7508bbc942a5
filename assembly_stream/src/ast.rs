// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The decoded statement/expression tree.
//!
//! Nodes own their children exclusively through their operand list; pool
//! references (constants, locals, globals, functions, import signatures,
//! pointer tables) are non-owning indices into the [`crate::module::Assembly`].
//! Operands appear in exact wire order, so the encoder can replay a node by
//! walking its operand list front to back.

use alloc::vec::Vec;

use crate::module::{FuncId, GlobalId, ImportSigId, TableId, ValType};
use crate::opcode::{AnyOp, SwitchCaseOp};

/// One operand of a statement/expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// An unsigned literal: `lit_imm` i32 payloads, nested-statement counts
    /// and label depths.
    U32(u32),
    /// A signed literal: switch-case labels.
    I32(i32),
    /// An f32 literal (`lit_imm` payload).
    F32(f32),
    /// An f64 literal (`lit_imm` payload).
    F64(f64),
    /// A constant-pool reference (pool selected by the value type).
    Const(ValType, u32),
    /// A local-variable reference (index into the enclosing function's
    /// locals).
    Local(u32),
    /// A global-variable reference.
    Global(GlobalId),
    /// A function-declaration reference (`call_int` target).
    Func(FuncId),
    /// A flattened import-signature reference (`call_imp` target).
    ImportSig(ImportSigId),
    /// A pointer-table reference (`call_ind` target).
    Table(TableId),
    /// A switch-case shape marker.
    Case(SwitchCaseOp),
    /// An owned child node.
    Node(AstNode),
}

impl Operand {
    /// Returns the child node, if this operand is one.
    #[must_use]
    pub fn node(&self) -> Option<&AstNode> {
        match self {
            Self::Node(n) => Some(n),
            _ => None,
        }
    }
}

/// A decoded statement or expression.
#[derive(Clone, Debug, PartialEq)]
pub struct AstNode {
    /// The node's opcode (kind-tagged).
    pub op: AnyOp,
    /// Whether the wire encoding used the packed opcode-with-immediate
    /// form. Preserved so re-encoding reproduces the original bytes.
    pub with_imm: bool,
    /// Operands in wire order: leading literals/references, then children
    /// (interleaved for `switch`).
    pub operands: Vec<Operand>,
}

impl AstNode {
    /// Creates a node with no operands.
    #[must_use]
    pub fn new(op: AnyOp) -> Self {
        Self {
            op,
            with_imm: false,
            operands: Vec::new(),
        }
    }

    /// Creates a node with the given operands.
    #[must_use]
    pub fn with_operands(op: AnyOp, operands: Vec<Operand>) -> Self {
        Self {
            op,
            with_imm: false,
            operands,
        }
    }

    /// Iterates over child nodes, skipping literal/reference operands.
    pub fn children(&self) -> impl Iterator<Item = &AstNode> {
        self.operands.iter().filter_map(Operand::node)
    }
}

/// A function body: a fixed-length ordered sequence of statements.
///
/// The length is known from a leading varint before any element is decoded;
/// the decoder fills the list append-only and attaches it to the function's
/// definition only once every slot is filled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StmtList {
    /// The statements, in order.
    pub stmts: Vec<AstNode>,
}

impl StmtList {
    /// Creates a statement list from its elements.
    #[must_use]
    pub fn new(stmts: Vec<AstNode>) -> Self {
        Self { stmts }
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// True if the list has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Iterates over the statements.
    pub fn iter(&self) -> core::slice::Iter<'_, AstNode> {
        self.stmts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{I32Op, StmtOp};
    use alloc::vec;

    #[test]
    fn children_skips_literals() {
        let inner = AstNode::with_operands(AnyOp::I32(I32Op::GetLoc), vec![Operand::Local(0)]);
        let node = AstNode::with_operands(
            AnyOp::Stmt(StmtOp::SetLoc),
            vec![Operand::Local(1), Operand::Node(inner.clone())],
        );
        let kids: Vec<&AstNode> = node.children().collect();
        assert_eq!(kids, vec![&inner]);
    }
}
