// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable rendering of an assembly and its function trees.
//!
//! The text format is line-oriented (pool summaries, then one indented line
//! per AST node) and intended for debugging and tests, not parsing. Tree
//! rendering is driven by an explicit stack so arbitrarily deep decoded
//! trees render without host recursion.

use alloc::vec::Vec;
use core::fmt;

use crate::ast::{AstNode, Operand};
use crate::module::{Assembly, Export};
use crate::opcode::Kind;

/// A borrowed, displayable view of an assembly.
#[must_use]
pub fn disassemble(asm: &Assembly) -> Disassembly<'_> {
    Disassembly { asm }
}

/// See [`disassemble`].
#[derive(Copy, Clone, Debug)]
pub struct Disassembly<'a> {
    asm: &'a Assembly,
}

impl<'a> Disassembly<'a> {
    /// The underlying assembly.
    #[must_use]
    pub fn assembly(&self) -> &'a Assembly {
        self.asm
    }
}

fn kind_prefix(kind: Kind) -> &'static str {
    match kind {
        Kind::Stmt => "",
        Kind::ExprI32 => "i32.",
        Kind::ExprF32 => "f32.",
        Kind::ExprF64 => "f64.",
        Kind::ExprVoid => "void.",
        Kind::SwitchCase => "case.",
    }
}

fn write_node_line(f: &mut fmt::Formatter<'_>, node: &AstNode, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        write!(f, "  ")?;
    }
    write!(f, "{}{}", kind_prefix(node.op.kind()), node.op.name())?;
    for operand in &node.operands {
        match operand {
            Operand::U32(v) => write!(f, " {v}")?,
            Operand::I32(v) => write!(f, " {v}")?,
            Operand::F32(v) => write!(f, " {v}")?,
            Operand::F64(v) => write!(f, " {v}")?,
            Operand::Const(_, index) => write!(f, " pool[{index}]")?,
            Operand::Local(index) => write!(f, " loc[{index}]")?,
            Operand::Global(id) => write!(f, " glo[{}]", id.0)?,
            Operand::Func(id) => write!(f, " func[{}]", id.0)?,
            Operand::ImportSig(id) => write!(f, " imp[{}]", id.0)?,
            Operand::Table(id) => write!(f, " tab[{}]", id.0)?,
            Operand::Case(op) => write!(f, " {}", op.name())?,
            Operand::Node(_) => {}
        }
    }
    writeln!(f)
}

fn write_tree(f: &mut fmt::Formatter<'_>, root: &AstNode, depth: usize) -> fmt::Result {
    let mut stack: Vec<(&AstNode, usize)> = Vec::new();
    stack.push((root, depth));
    while let Some((node, depth)) = stack.pop() {
        write_node_line(f, node, depth)?;
        for operand in node.operands.iter().rev() {
            if let Operand::Node(child) = operand {
                stack.push((child, depth + 1));
            }
        }
    }
    Ok(())
}

fn write_sig(f: &mut fmt::Formatter<'_>, asm: &Assembly, sig: u32) -> fmt::Result {
    match asm.signatures.get(sig as usize) {
        Some(s) => {
            write!(f, "{}(", s.ret.name())?;
            for (i, arg) in s.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg.name())?;
            }
            write!(f, ")")
        }
        None => write!(f, "sig[{sig}]?"),
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let asm = self.asm;
        writeln!(
            f,
            "assembly: {} const(s), {} signature(s), {} import(s), {} global(s), {} function(s), {} table(s)",
            asm.consts_i32.len() + asm.consts_f32.len() + asm.consts_f64.len(),
            asm.signatures.len(),
            asm.imports.len(),
            asm.globals.len(),
            asm.declarations.len(),
            asm.pointer_tables.len(),
        )?;

        for (i, v) in asm.consts_i32.iter().enumerate() {
            writeln!(f, "const i32[{i}] = {v}")?;
        }
        for (i, v) in asm.consts_f32.iter().enumerate() {
            writeln!(f, "const f32[{i}] = {v}")?;
        }
        for (i, v) in asm.consts_f64.iter().enumerate() {
            writeln!(f, "const f64[{i}] = {v}")?;
        }

        for i in 0..asm.signatures.len() {
            write!(f, "sig[{i}] = ")?;
            write_sig(f, asm, i as u32)?;
            writeln!(f)?;
        }

        for (i, import) in asm.imports.iter().enumerate() {
            write!(f, "import[{i}] \"{}\":", import.name)?;
            for sig in &import.sigs {
                write!(f, " sig[{}]", sig.0)?;
            }
            writeln!(f)?;
        }

        for (i, global) in asm.globals.iter().enumerate() {
            match &global.import_name {
                Some(name) => writeln!(f, "glo[{i}] {} = import \"{name}\"", global.ty.name())?,
                None => writeln!(f, "glo[{i}] {} = 0", global.ty.name())?,
            }
        }

        for (i, table) in asm.pointer_tables.iter().enumerate() {
            write!(f, "tab[{i}] sig[{}] = [", table.sig.0)?;
            for (j, elem) in table.elems.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "func[{}]", elem.0)?;
            }
            writeln!(f, "]")?;
        }

        for (i, def) in asm.definitions.iter().enumerate() {
            write!(f, "func[{i}] ")?;
            if let Some(decl) = asm.declarations.get(i) {
                write_sig(f, asm, decl.sig.0)?;
            }
            write!(f, " locals [")?;
            for (j, local) in def.locals.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", local.ty.name())?;
            }
            writeln!(f, "]")?;
            for stmt in def.body.iter() {
                write_tree(f, stmt, 1)?;
            }
        }

        match &asm.export {
            Export::Default(func) => writeln!(f, "export default func[{}]", func.0)?,
            Export::Record(entries) => {
                for entry in entries {
                    writeln!(f, "export \"{}\" = func[{}]", entry.name, entry.func.0)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::node;
    use crate::builder::AssemblyBuilder;
    use crate::module::{RetType, ValType};
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn renders_nested_trees_with_indentation() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
        let func = b.declare(sig).unwrap();
        b.define(
            func,
            0,
            0,
            0,
            node::stmts(vec![node::ret(node::i32_binary(
                crate::opcode::I32Op::Add,
                node::i32_get_loc(0),
                node::i32_get_loc(1),
            ))]),
        )
        .unwrap();
        b.export_default(func).unwrap();
        let asm = b.build().unwrap();
        let text = disassemble(&asm).to_string();
        assert!(text.contains("sig[0] = i32(i32, i32)"));
        assert!(text.contains("\n  ret\n"));
        assert!(text.contains("\n    i32.add\n"));
        assert!(text.contains("\n      i32.get_loc loc[0]\n"));
        assert!(text.contains("export default func[0]"));
    }

    #[test]
    fn renders_switch_markers_inline() {
        let mut b = AssemblyBuilder::new();
        let sig = b.signature(RetType::Void, vec![ValType::I32]);
        let func = b.declare(sig).unwrap();
        b.define(
            func,
            0,
            0,
            0,
            node::stmts(vec![node::switch(
                node::i32_get_loc(0),
                vec![node::SwitchArm::Case0(3), node::SwitchArm::Default0],
            )]),
        )
        .unwrap();
        b.export_default(func).unwrap();
        let asm = b.build().unwrap();
        let text = disassemble(&asm).to_string();
        assert!(text.contains("switch case0 3 default0"));
    }
}
