// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The cross-referenced module model ("assembly").
//!
//! An [`Assembly`] owns, in wire order: three constant pools, the signature
//! table, imports plus their flattened `(import, signature)` entries, the
//! global table, function declarations with their definitions, indirect-call
//! pointer tables, and exactly one export descriptor. All cross-references
//! are plain indices wrapped in newtypes; every accessor range-checks and
//! reports a fatal [`DecodeError::OutOfBounds`] on a dangling index.

use alloc::string::String;
use alloc::vec::Vec;

use crate::ast::StmtList;
use crate::format::DecodeError;

/// A value type: the type of an argument, local, global or constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValType {
    /// 32-bit integer.
    I32 = 0,
    /// IEEE 754 32-bit float.
    F32 = 1,
    /// IEEE 754 64-bit float.
    F64 = 2,
}

impl ValType {
    /// Parses a value-type byte. `Void` (3) is rejected as
    /// [`DecodeError::VoidArgument`]; anything else as a bad type code.
    pub fn from_u8(code: u8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::I32),
            1 => Ok(Self::F32),
            2 => Ok(Self::F64),
            3 => Err(DecodeError::VoidArgument),
            _ => Err(DecodeError::BadTypeCode { code }),
        }
    }

    /// The wire code for this type.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Widens to a return type.
    #[must_use]
    pub fn ret(self) -> RetType {
        match self {
            Self::I32 => RetType::I32,
            Self::F32 => RetType::F32,
            Self::F64 => RetType::F64,
        }
    }

    /// Lowercase name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

/// A return type: a value type or `Void`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RetType {
    /// 32-bit integer.
    I32 = 0,
    /// IEEE 754 32-bit float.
    F32 = 1,
    /// IEEE 754 64-bit float.
    F64 = 2,
    /// No value.
    Void = 3,
}

impl RetType {
    /// Parses a return-type byte.
    pub fn from_u8(code: u8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::I32),
            1 => Ok(Self::F32),
            2 => Ok(Self::F64),
            3 => Ok(Self::Void),
            _ => Err(DecodeError::BadTypeCode { code }),
        }
    }

    /// The wire code for this type.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Narrows to a value type; `None` for `Void`.
    #[must_use]
    pub fn val(self) -> Option<ValType> {
        match self {
            Self::I32 => Some(ValType::I32),
            Self::F32 => Some(ValType::F32),
            Self::F64 => Some(ValType::F64),
            Self::Void => None,
        }
    }

    /// Lowercase name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Void => "void",
        }
    }
}

/// Signature table identifier (index into [`Assembly::signatures`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SigId(pub u32);

/// Import table identifier (index into [`Assembly::imports`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportId(pub u32);

/// Flattened import-signature identifier (index into
/// [`Assembly::import_sigs`]). Call sites address imports through this
/// table, not through [`ImportId`], because one import may be callable at
/// several signatures.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportSigId(pub u32);

/// Global table identifier (index into [`Assembly::globals`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Function identifier (index into [`Assembly::declarations`] and, once
/// bodies are decoded, [`Assembly::definitions`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Pointer-table identifier (index into [`Assembly::pointer_tables`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableId(pub u32);

/// The pool a dangling cross-reference pointed into (error context).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolKind {
    /// The i32 constant pool.
    ConstI32,
    /// The f32 constant pool.
    ConstF32,
    /// The f64 constant pool.
    ConstF64,
    /// The signature table.
    Signatures,
    /// The import table.
    Imports,
    /// The flattened import-signature table.
    ImportSigs,
    /// The global table.
    Globals,
    /// The function declaration table.
    Declarations,
    /// The pointer-table list.
    PointerTables,
    /// A function's local variable list.
    Locals,
}

impl PoolKind {
    /// Lowercase name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ConstI32 => "i32 constant",
            Self::ConstF32 => "f32 constant",
            Self::ConstF64 => "f64 constant",
            Self::Signatures => "signature",
            Self::Imports => "import",
            Self::ImportSigs => "import-signature",
            Self::Globals => "global",
            Self::Declarations => "function",
            Self::PointerTables => "pointer table",
            Self::Locals => "local",
        }
    }
}

/// A function signature: return type plus ordered argument types. Shared by
/// index across declarations, imports and pointer tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Return type.
    pub ret: RetType,
    /// Argument types, in call order.
    pub args: Vec<ValType>,
}

/// An imported function, callable at one or more signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// Import name.
    pub name: String,
    /// Signatures this import may be called at, in wire order.
    pub sigs: Vec<SigId>,
}

/// One flattened `(import, signature)` pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImportSig {
    /// The import this entry belongs to.
    pub import: ImportId,
    /// The signature it is callable at.
    pub sig: SigId,
}

/// A global variable.
///
/// The global table's ordering is a wire-format invariant: all
/// zero-initialized i32 globals, then f32, then f64, then imported i32, f32
/// and f64 globals, six runs whose lengths are written up front. Import
/// names are attached only to globals in the imported runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Global {
    /// The global's value type.
    pub ty: ValType,
    /// Import name for imported globals, `None` for zero-initialized ones.
    pub import_name: Option<String>,
}

/// A function declaration: just a signature reference. The body arrives
/// later as a [`FuncDef`] at the same index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FuncDecl {
    /// The declared signature.
    pub sig: SigId,
}

/// A local variable slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Local {
    /// The local's value type.
    pub ty: ValType,
}

/// A decoded function body.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncDef {
    /// Locals: the signature's arguments first (in order), then declared
    /// extra i32 locals, then extra f32, then extra f64.
    pub locals: Vec<Local>,
    /// Byte offset of the body's statement stream in the encoded module
    /// (zero for assemblies built programmatically).
    pub body_offset: u32,
    /// Byte length of the body's statement stream (zero for assemblies
    /// built programmatically).
    pub body_len: u32,
    /// The decoded statement tree.
    pub body: StmtList,
}

/// An indirect-call ("function pointer") table: a signature plus an ordered
/// list of function elements. The dynamic element index of a call through
/// the table is an expression checked only by signature agreement here;
/// range-checking that index is a runtime concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerTable {
    /// The signature every element must be callable at.
    pub sig: SigId,
    /// Element function indices.
    pub elems: Vec<FuncId>,
}

/// One exported-function record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportEntry {
    /// Export name.
    pub name: String,
    /// Exported function.
    pub func: FuncId,
}

/// The module's export descriptor (exactly one per module).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Export {
    /// A single unnamed default export.
    Default(FuncId),
    /// A record of named exports.
    Record(Vec<ExportEntry>),
}

/// A fully decoded (or programmatically built) module.
#[derive(Clone, Debug, PartialEq)]
pub struct Assembly {
    /// i32 constant pool (raw bit patterns).
    pub consts_i32: Vec<u32>,
    /// f32 constant pool.
    pub consts_f32: Vec<f32>,
    /// f64 constant pool.
    pub consts_f64: Vec<f64>,
    /// Signature table.
    pub signatures: Vec<Signature>,
    /// Import table.
    pub imports: Vec<Import>,
    /// Flattened `(import, signature)` table, in wire order.
    pub import_sigs: Vec<ImportSig>,
    /// Global table (see [`Global`] for the ordering invariant).
    pub globals: Vec<Global>,
    /// Function declarations.
    pub declarations: Vec<FuncDecl>,
    /// Function definitions, parallel to `declarations`.
    pub definitions: Vec<FuncDef>,
    /// Indirect-call pointer tables.
    pub pointer_tables: Vec<PointerTable>,
    /// The export descriptor.
    pub export: Export,
    /// Total byte size declared in the header. Recorded for write-back; the
    /// encoder recomputes it rather than echoing it.
    pub declared_size: u32,
}

fn check(index: u32, len: usize, pool: PoolKind) -> Result<usize, DecodeError> {
    if (index as usize) < len {
        Ok(index as usize)
    } else {
        Err(DecodeError::OutOfBounds {
            pool,
            index,
            len: len as u32,
        })
    }
}

impl Assembly {
    /// Looks up an i32 constant.
    pub fn const_i32(&self, index: u32) -> Result<u32, DecodeError> {
        Ok(self.consts_i32[check(index, self.consts_i32.len(), PoolKind::ConstI32)?])
    }

    /// Looks up an f32 constant.
    pub fn const_f32(&self, index: u32) -> Result<f32, DecodeError> {
        Ok(self.consts_f32[check(index, self.consts_f32.len(), PoolKind::ConstF32)?])
    }

    /// Looks up an f64 constant.
    pub fn const_f64(&self, index: u32) -> Result<f64, DecodeError> {
        Ok(self.consts_f64[check(index, self.consts_f64.len(), PoolKind::ConstF64)?])
    }

    /// Looks up a signature.
    pub fn signature(&self, id: SigId) -> Result<&Signature, DecodeError> {
        Ok(&self.signatures[check(id.0, self.signatures.len(), PoolKind::Signatures)?])
    }

    /// Looks up an import.
    pub fn import(&self, id: ImportId) -> Result<&Import, DecodeError> {
        Ok(&self.imports[check(id.0, self.imports.len(), PoolKind::Imports)?])
    }

    /// Looks up a flattened import-signature entry.
    pub fn import_sig(&self, id: ImportSigId) -> Result<ImportSig, DecodeError> {
        Ok(self.import_sigs[check(id.0, self.import_sigs.len(), PoolKind::ImportSigs)?])
    }

    /// Looks up a global.
    pub fn global(&self, id: GlobalId) -> Result<&Global, DecodeError> {
        Ok(&self.globals[check(id.0, self.globals.len(), PoolKind::Globals)?])
    }

    /// Looks up a function declaration.
    pub fn declaration(&self, id: FuncId) -> Result<FuncDecl, DecodeError> {
        Ok(self.declarations[check(id.0, self.declarations.len(), PoolKind::Declarations)?])
    }

    /// Looks up a function definition.
    pub fn definition(&self, id: FuncId) -> Result<&FuncDef, DecodeError> {
        Ok(&self.definitions[check(id.0, self.definitions.len(), PoolKind::Declarations)?])
    }

    /// Looks up a pointer table.
    pub fn pointer_table(&self, id: TableId) -> Result<&PointerTable, DecodeError> {
        Ok(&self.pointer_tables[check(id.0, self.pointer_tables.len(), PoolKind::PointerTables)?])
    }

    /// Returns a function's signature.
    pub fn func_signature(&self, id: FuncId) -> Result<&Signature, DecodeError> {
        self.signature(self.declaration(id)?.sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Assembly {
        Assembly {
            consts_i32: Vec::from([7]),
            consts_f32: Vec::new(),
            consts_f64: Vec::new(),
            signatures: Vec::from([Signature {
                ret: RetType::Void,
                args: Vec::new(),
            }]),
            imports: Vec::new(),
            import_sigs: Vec::new(),
            globals: Vec::new(),
            declarations: Vec::from([FuncDecl { sig: SigId(0) }]),
            definitions: Vec::new(),
            pointer_tables: Vec::new(),
            export: Export::Default(FuncId(0)),
            declared_size: 0,
        }
    }

    #[test]
    fn last_valid_index_succeeds() {
        let a = tiny();
        assert_eq!(a.const_i32(0).unwrap(), 7);
        assert_eq!(a.func_signature(FuncId(0)).unwrap().ret, RetType::Void);
    }

    #[test]
    fn out_of_bounds_index_is_fatal_with_context() {
        let a = tiny();
        assert_eq!(
            a.const_i32(1),
            Err(DecodeError::OutOfBounds {
                pool: PoolKind::ConstI32,
                index: 1,
                len: 1
            })
        );
        assert_eq!(
            a.signature(SigId(9)),
            Err(DecodeError::OutOfBounds {
                pool: PoolKind::Signatures,
                index: 9,
                len: 1
            })
        );
    }

    #[test]
    fn void_is_not_a_value_type() {
        assert_eq!(ValType::from_u8(3), Err(DecodeError::VoidArgument));
        assert_eq!(RetType::from_u8(3), Ok(RetType::Void));
        assert_eq!(RetType::from_u8(4), Err(DecodeError::BadTypeCode { code: 4 }));
    }
}
