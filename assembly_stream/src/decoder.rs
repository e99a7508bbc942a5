// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The top-level section decoder.
//!
//! A [`Decoder`] consumes a module stream in arbitrary chunks and drives a
//! strictly ordered section state machine: header, constant pools,
//! signatures, imports, globals, declarations, pointer tables, one body per
//! declared function, then the export descriptor. Each state handler reads
//! its complete fixed shape before committing; a dry buffer abandons the
//! handler via cursor rollback and re-runs it verbatim on the next
//! [`Decoder::feed`]. Repeated sections commit one element at a time so a
//! short read mid-pool only retries the current element.
//!
//! Function bodies are delegated to the AST decoder bound to the same
//! cursor; control is handed off strictly, never interleaved.

use alloc::vec::Vec;

use crate::ast::StmtList;
use crate::astread::{AstDecoder, AstProgress, FnCtx};
use crate::cursor::{ByteCursor, ReadError};
use crate::format::{DecodeError, MAGIC, unpack_with_imm};
use crate::module::{
    Assembly, Export, ExportEntry, FuncDecl, FuncDef, FuncId, Global, Import, ImportId, ImportSig,
    Local, PointerTable, PoolKind, RetType, SigId, Signature, ValType,
};
use crate::opcode::ExportFormat;

/// Decode progress states, in wire order. No state is skipped and none is
/// revisited.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Header,
    ConstCounts,
    ConstI32,
    ConstF32,
    ConstF64,
    SigCount,
    Sigs,
    ImportCount,
    Imports,
    GlobalCounts,
    GlobalNames,
    DeclCount,
    Decls,
    TableCount,
    Tables,
    FuncLocals,
    FuncBody,
    Export,
    End,
}

/// A per-section completion notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// The header was read and validated.
    Header {
        /// Total byte size declared in the header.
        declared_size: u32,
    },
    /// All three constant pools are populated.
    ConstantPools {
        /// Number of i32 constants.
        i32_count: u32,
        /// Number of f32 constants.
        f32_count: u32,
        /// Number of f64 constants.
        f64_count: u32,
    },
    /// The signature table is populated.
    Signatures {
        /// Number of signatures.
        count: u32,
    },
    /// The import table and its flattened entries are populated.
    Imports {
        /// Number of imports.
        imports: u32,
        /// Number of flattened `(import, signature)` entries.
        import_sigs: u32,
    },
    /// The global table is populated.
    Globals {
        /// Number of globals (zero-initialized plus imported).
        count: u32,
    },
    /// The declaration table is populated.
    Declarations {
        /// Number of declared functions.
        count: u32,
    },
    /// The pointer tables are populated.
    PointerTables {
        /// Number of pointer tables.
        count: u32,
    },
    /// One function body finished decoding.
    FunctionBody {
        /// The function whose AST is now attached.
        func: FuncId,
    },
    /// The export descriptor was read.
    Export,
    /// The module is complete; [`Decoder::finish`] will succeed.
    AssemblyReady,
}

/// A streaming module decoder.
///
/// Feed chunks with [`Decoder::feed`] (any chunking decodes identically),
/// then call [`Decoder::finish`] at end of input. Fatal errors poison the
/// session permanently; "not enough bytes yet" is never an error.
#[derive(Debug)]
pub struct Decoder {
    cursor: ByteCursor,
    state: State,
    poisoned: bool,
    events: Vec<DecodeEvent>,

    declared_size: u32,
    n_const_i32: u32,
    n_const_f32: u32,
    n_const_f64: u32,
    n_sigs: u32,
    n_imports: u32,
    n_import_sigs: u32,
    n_global_imports: [u32; 3],
    n_zero_globals: u32,
    n_decls: u32,
    n_tables: u32,

    consts_i32: Vec<u32>,
    consts_f32: Vec<f32>,
    consts_f64: Vec<f64>,
    signatures: Vec<Signature>,
    imports: Vec<Import>,
    import_sigs: Vec<ImportSig>,
    globals: Vec<Global>,
    declarations: Vec<FuncDecl>,
    definitions: Vec<FuncDef>,
    pointer_tables: Vec<PointerTable>,
    export: Option<Export>,

    next_func: u32,
    cur_locals: Vec<Local>,
    cur_ret: RetType,
    body_start: usize,
    ast: AstDecoder,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
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

impl Decoder {
    /// Creates a decoder at the start of a fresh session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cursor: ByteCursor::new(),
            state: State::Header,
            poisoned: false,
            events: Vec::new(),
            declared_size: 0,
            n_const_i32: 0,
            n_const_f32: 0,
            n_const_f64: 0,
            n_sigs: 0,
            n_imports: 0,
            n_import_sigs: 0,
            n_global_imports: [0; 3],
            n_zero_globals: 0,
            n_decls: 0,
            n_tables: 0,
            consts_i32: Vec::new(),
            consts_f32: Vec::new(),
            consts_f64: Vec::new(),
            signatures: Vec::new(),
            imports: Vec::new(),
            import_sigs: Vec::new(),
            globals: Vec::new(),
            declarations: Vec::new(),
            definitions: Vec::new(),
            pointer_tables: Vec::new(),
            export: None,
            next_func: 0,
            cur_locals: Vec::new(),
            cur_ret: RetType::Void,
            body_start: 0,
            ast: AstDecoder::new(),
        }
    }

    /// Appends a chunk and drives decoding as far as the buffered bytes
    /// allow. Returns the section-completion events raised during this
    /// call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<DecodeEvent>, DecodeError> {
        if self.poisoned {
            return Err(DecodeError::Poisoned);
        }
        self.cursor.push(chunk);
        match self.drive() {
            Ok(()) => Ok(core::mem::take(&mut self.events)),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// True once every section (including the export) has decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == State::End && !self.poisoned
    }

    /// Signals end of input and returns the decoded assembly.
    pub fn finish(self) -> Result<Assembly, DecodeError> {
        if self.poisoned {
            return Err(DecodeError::Poisoned);
        }
        if self.state != State::End {
            return Err(DecodeError::UnexpectedEnd);
        }
        let Some(export) = self.export else {
            return Err(DecodeError::Poisoned);
        };
        Ok(Assembly {
            consts_i32: self.consts_i32,
            consts_f32: self.consts_f32,
            consts_f64: self.consts_f64,
            signatures: self.signatures,
            imports: self.imports,
            import_sigs: self.import_sigs,
            globals: self.globals,
            declarations: self.declarations,
            definitions: self.definitions,
            pointer_tables: self.pointer_tables,
            export,
            declared_size: self.declared_size,
        })
    }

    fn drive(&mut self) -> Result<(), DecodeError> {
        loop {
            if self.state == State::End {
                let remaining = self.cursor.remaining();
                if remaining > 0 {
                    return Err(DecodeError::TrailingBytes { remaining });
                }
                return Ok(());
            }
            match self.step() {
                Ok(()) => {}
                Err(ReadError::NeedMore) => {
                    self.cursor.reset();
                    return Ok(());
                }
                Err(ReadError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn step(&mut self) -> Result<(), ReadError> {
        match self.state {
            State::Header => self.step_header(),
            State::ConstCounts => self.step_const_counts(),
            State::ConstI32 => self.step_const_i32(),
            State::ConstF32 => self.step_const_f32(),
            State::ConstF64 => self.step_const_f64(),
            State::SigCount => self.step_sig_count(),
            State::Sigs => self.step_sigs(),
            State::ImportCount => self.step_import_count(),
            State::Imports => self.step_imports(),
            State::GlobalCounts => self.step_global_counts(),
            State::GlobalNames => self.step_global_names(),
            State::DeclCount => self.step_decl_count(),
            State::Decls => self.step_decls(),
            State::TableCount => self.step_table_count(),
            State::Tables => self.step_tables(),
            State::FuncLocals => self.step_func_locals(),
            State::FuncBody => self.step_func_body(),
            State::Export => self.step_export(),
            State::End => Ok(()),
        }
    }

    fn step_header(&mut self) -> Result<(), ReadError> {
        let magic = self.cursor.read_u32_le()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic { found: magic }.into());
        }
        let declared_size = self.cursor.read_u32_le()?;
        self.cursor.advance();
        self.declared_size = declared_size;
        self.events.push(DecodeEvent::Header { declared_size });
        self.state = State::ConstCounts;
        Ok(())
    }

    fn step_const_counts(&mut self) -> Result<(), ReadError> {
        let i32s = self.cursor.read_varint_u32()?;
        let f32s = self.cursor.read_varint_u32()?;
        let f64s = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.n_const_i32 = i32s;
        self.n_const_f32 = f32s;
        self.n_const_f64 = f64s;
        self.consts_i32.reserve(i32s as usize);
        self.consts_f32.reserve(f32s as usize);
        self.consts_f64.reserve(f64s as usize);
        self.state = State::ConstI32;
        Ok(())
    }

    fn step_const_i32(&mut self) -> Result<(), ReadError> {
        if self.consts_i32.len() as u32 == self.n_const_i32 {
            self.state = State::ConstF32;
            return Ok(());
        }
        let v = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.consts_i32.push(v);
        Ok(())
    }

    fn step_const_f32(&mut self) -> Result<(), ReadError> {
        if self.consts_f32.len() as u32 == self.n_const_f32 {
            self.state = State::ConstF64;
            return Ok(());
        }
        let v = self.cursor.read_f32_le()?;
        self.cursor.advance();
        self.consts_f32.push(v);
        Ok(())
    }

    fn step_const_f64(&mut self) -> Result<(), ReadError> {
        if self.consts_f64.len() as u32 == self.n_const_f64 {
            self.events.push(DecodeEvent::ConstantPools {
                i32_count: self.n_const_i32,
                f32_count: self.n_const_f32,
                f64_count: self.n_const_f64,
            });
            self.state = State::SigCount;
            return Ok(());
        }
        let v = self.cursor.read_f64_le()?;
        self.cursor.advance();
        self.consts_f64.push(v);
        Ok(())
    }

    fn step_sig_count(&mut self) -> Result<(), ReadError> {
        let n = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.n_sigs = n;
        self.signatures.reserve(n as usize);
        self.state = State::Sigs;
        Ok(())
    }

    fn step_sigs(&mut self) -> Result<(), ReadError> {
        if self.signatures.len() as u32 == self.n_sigs {
            self.events.push(DecodeEvent::Signatures { count: self.n_sigs });
            self.state = State::ImportCount;
            return Ok(());
        }
        let ret = RetType::from_u8(self.cursor.read_u8()?)?;
        let argc = self.cursor.read_varint_u32()?;
        let mut args = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            args.push(ValType::from_u8(self.cursor.read_u8()?)?);
        }
        self.cursor.advance();
        self.signatures.push(Signature { ret, args });
        Ok(())
    }

    fn step_import_count(&mut self) -> Result<(), ReadError> {
        let imports = self.cursor.read_varint_u32()?;
        let flattened = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.n_imports = imports;
        self.n_import_sigs = flattened;
        self.imports.reserve(imports as usize);
        self.import_sigs.reserve(flattened as usize);
        self.state = State::Imports;
        Ok(())
    }

    fn step_imports(&mut self) -> Result<(), ReadError> {
        if self.imports.len() as u32 == self.n_imports {
            if self.import_sigs.len() as u32 != self.n_import_sigs {
                return Err(DecodeError::ImportSigCountMismatch {
                    declared: self.n_import_sigs,
                    actual: self.import_sigs.len() as u32,
                }
                .into());
            }
            self.events.push(DecodeEvent::Imports {
                imports: self.n_imports,
                import_sigs: self.n_import_sigs,
            });
            self.state = State::GlobalCounts;
            return Ok(());
        }
        let name = self.cursor.read_cstring()?;
        let sig_count = self.cursor.read_varint_u32()?;
        let mut sigs = Vec::with_capacity(sig_count as usize);
        for _ in 0..sig_count {
            let sig = self.cursor.read_varint_u32()?;
            check(sig, self.signatures.len(), PoolKind::Signatures)?;
            sigs.push(SigId(sig));
        }
        self.cursor.advance();
        let import = ImportId(self.imports.len() as u32);
        for &sig in &sigs {
            self.import_sigs.push(ImportSig { import, sig });
        }
        self.imports.push(Import { name, sigs });
        Ok(())
    }

    fn step_global_counts(&mut self) -> Result<(), ReadError> {
        let zero_i32 = self.cursor.read_varint_u32()?;
        let zero_f32 = self.cursor.read_varint_u32()?;
        let zero_f64 = self.cursor.read_varint_u32()?;
        let imp_i32 = self.cursor.read_varint_u32()?;
        let imp_f32 = self.cursor.read_varint_u32()?;
        let imp_f64 = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        // The six-run grouping is the wire invariant: zero-initialized runs
        // are materialized here, imported runs as their names arrive.
        for (ty, n) in [
            (ValType::I32, zero_i32),
            (ValType::F32, zero_f32),
            (ValType::F64, zero_f64),
        ] {
            for _ in 0..n {
                self.globals.push(Global {
                    ty,
                    import_name: None,
                });
            }
        }
        self.n_zero_globals = zero_i32 + zero_f32 + zero_f64;
        self.n_global_imports = [imp_i32, imp_f32, imp_f64];
        self.state = State::GlobalNames;
        Ok(())
    }

    fn step_global_names(&mut self) -> Result<(), ReadError> {
        let named = self.globals.len() as u32 - self.n_zero_globals;
        let [imp_i32, imp_f32, imp_f64] = self.n_global_imports;
        if named == imp_i32 + imp_f32 + imp_f64 {
            self.events.push(DecodeEvent::Globals {
                count: self.globals.len() as u32,
            });
            self.state = State::DeclCount;
            return Ok(());
        }
        let ty = if named < imp_i32 {
            ValType::I32
        } else if named < imp_i32 + imp_f32 {
            ValType::F32
        } else {
            ValType::F64
        };
        let name = self.cursor.read_cstring()?;
        self.cursor.advance();
        self.globals.push(Global {
            ty,
            import_name: Some(name),
        });
        Ok(())
    }

    fn step_decl_count(&mut self) -> Result<(), ReadError> {
        let n = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.n_decls = n;
        self.declarations.reserve(n as usize);
        self.definitions.reserve(n as usize);
        self.state = State::Decls;
        Ok(())
    }

    fn step_decls(&mut self) -> Result<(), ReadError> {
        if self.declarations.len() as u32 == self.n_decls {
            self.events.push(DecodeEvent::Declarations { count: self.n_decls });
            self.state = State::TableCount;
            return Ok(());
        }
        let sig = self.cursor.read_varint_u32()?;
        check(sig, self.signatures.len(), PoolKind::Signatures)?;
        self.cursor.advance();
        self.declarations.push(FuncDecl { sig: SigId(sig) });
        Ok(())
    }

    fn step_table_count(&mut self) -> Result<(), ReadError> {
        let n = self.cursor.read_varint_u32()?;
        self.cursor.advance();
        self.n_tables = n;
        self.pointer_tables.reserve(n as usize);
        self.state = State::Tables;
        Ok(())
    }

    fn step_tables(&mut self) -> Result<(), ReadError> {
        if self.pointer_tables.len() as u32 == self.n_tables {
            self.events.push(DecodeEvent::PointerTables { count: self.n_tables });
            self.state = if self.n_decls == 0 {
                State::Export
            } else {
                State::FuncLocals
            };
            return Ok(());
        }
        let sig = self.cursor.read_varint_u32()?;
        check(sig, self.signatures.len(), PoolKind::Signatures)?;
        let elem_count = self.cursor.read_varint_u32()?;
        let mut elems = Vec::with_capacity(elem_count as usize);
        for _ in 0..elem_count {
            let func = self.cursor.read_varint_u32()?;
            check(func, self.declarations.len(), PoolKind::Declarations)?;
            elems.push(FuncId(func));
        }
        self.cursor.advance();
        self.pointer_tables.push(PointerTable {
            sig: SigId(sig),
            elems,
        });
        Ok(())
    }

    fn step_func_locals(&mut self) -> Result<(), ReadError> {
        let byte = self.cursor.read_u8()?;
        let (extra_i32, extra_f32, extra_f64) = if let Some((sel, imm)) = unpack_with_imm(byte) {
            // Only selector 0 ("N extra i32 locals") has a packed form.
            if sel != 0 {
                return Err(DecodeError::BadLocalsPrefix { byte }.into());
            }
            (u32::from(imm), 0, 0)
        } else {
            if byte & !0x7 != 0 {
                return Err(DecodeError::BadLocalsPrefix { byte }.into());
            }
            let i = if byte & 0x1 != 0 {
                self.cursor.read_varint_u32()?
            } else {
                0
            };
            let f = if byte & 0x2 != 0 {
                self.cursor.read_varint_u32()?
            } else {
                0
            };
            let d = if byte & 0x4 != 0 {
                self.cursor.read_varint_u32()?
            } else {
                0
            };
            (i, f, d)
        };
        self.cursor.advance();

        let decl = self.declarations[self.next_func as usize];
        let sig = &self.signatures[decl.sig.0 as usize];
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
        self.cur_locals = locals;
        self.cur_ret = sig.ret;
        self.body_start = self.cursor.consumed();
        self.ast = AstDecoder::new();
        self.state = State::FuncBody;
        Ok(())
    }

    fn step_func_body(&mut self) -> Result<(), ReadError> {
        let Self {
            cursor,
            ast,
            consts_i32,
            consts_f32,
            consts_f64,
            signatures,
            import_sigs,
            globals,
            declarations,
            pointer_tables,
            cur_locals,
            cur_ret,
            ..
        } = self;
        let ctx = FnCtx {
            sigs: signatures,
            import_sigs,
            globals,
            decls: declarations,
            tables: pointer_tables,
            locals: cur_locals,
            consts_i32_len: consts_i32.len(),
            consts_f32_len: consts_f32.len(),
            consts_f64_len: consts_f64.len(),
            ret: *cur_ret,
        };
        match ast.drive(cursor, &ctx) {
            Ok(AstProgress::Complete(body)) => {
                self.attach_body(body);
                Ok(())
            }
            Ok(AstProgress::Suspended) => Err(ReadError::NeedMore),
            Err(e) => Err(e.into()),
        }
    }

    fn attach_body(&mut self, body: StmtList) {
        let func = FuncId(self.next_func);
        let body_offset = self.body_start as u32;
        let body_len = (self.cursor.consumed() - self.body_start) as u32;
        self.definitions.push(FuncDef {
            locals: core::mem::take(&mut self.cur_locals),
            body_offset,
            body_len,
            body,
        });
        self.events.push(DecodeEvent::FunctionBody { func });
        self.next_func += 1;
        self.state = if self.next_func == self.n_decls {
            State::Export
        } else {
            State::FuncLocals
        };
    }

    fn step_export(&mut self) -> Result<(), ReadError> {
        let tag = self.cursor.read_u8()?;
        let format =
            ExportFormat::from_u8(tag).ok_or(DecodeError::BadExportFormat { tag })?;
        let export = match format {
            ExportFormat::Default => {
                let func = self.cursor.read_varint_u32()?;
                check(func, self.declarations.len(), PoolKind::Declarations)?;
                Export::Default(FuncId(func))
            }
            ExportFormat::Record => {
                let count = self.cursor.read_varint_u32()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = self.cursor.read_cstring()?;
                    let func = self.cursor.read_varint_u32()?;
                    check(func, self.declarations.len(), PoolKind::Declarations)?;
                    entries.push(ExportEntry {
                        name,
                        func: FuncId(func),
                    });
                }
                Export::Record(entries)
            }
        };
        self.cursor.advance();
        self.export = Some(export);
        self.events.push(DecodeEvent::Export);
        self.events.push(DecodeEvent::AssemblyReady);
        self.state = State::End;
        Ok(())
    }
}

/// Decodes a complete module from a single buffer.
pub fn decode(bytes: &[u8]) -> Result<Assembly, DecodeError> {
    let mut d = Decoder::new();
    d.feed(bytes)?;
    d.finish()
}
