// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opcode tables for every wire kind.
//!
//! Each concrete opcode belongs to exactly one kind's table. Kinds that
//! support the packed-immediate byte (statements and the three value-typed
//! expression kinds) additionally carry a partial bidirectional mapping
//! between full opcodes and their 2-bit with-immediate selectors. These
//! tables are pure data; both the decoder and the encoder consume them.

macro_rules! opcode_table {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident = $value:literal => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant = $value,
            )+
        }

        impl $name {
            /// Parses an opcode from its plain byte value.
            #[must_use]
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The plain opcode byte.
            #[must_use]
            pub fn byte(self) -> u8 {
                self as u8
            }

            /// Human-readable name for diagnostics.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }
    };
}

macro_rules! with_imm_selectors {
    ($name:ident { $($variant:ident = $sel:literal,)+ }) => {
        impl $name {
            /// Maps a 2-bit packed selector back to its full opcode.
            #[must_use]
            pub fn from_selector(sel: u8) -> Option<Self> {
                match sel {
                    $($sel => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The packed selector for this opcode, if it has a
            /// with-immediate form.
            #[must_use]
            pub fn imm_selector(self) -> Option<u8> {
                match self {
                    $(Self::$variant => Some($sel),)+
                    _ => None,
                }
            }
        }
    };
}

/// A wire kind: which opcode table governs decoding at a tree position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Void-returning statement position.
    Stmt,
    /// i32-valued expression position.
    ExprI32,
    /// f32-valued expression position.
    ExprF32,
    /// f64-valued expression position.
    ExprF64,
    /// Void call in expression position.
    ExprVoid,
    /// Switch-case pseudo-position inside a `switch` statement.
    SwitchCase,
}

impl Kind {
    /// Lowercase name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stmt => "stmt",
            Self::ExprI32 => "i32",
            Self::ExprF32 => "f32",
            Self::ExprF64 => "f64",
            Self::ExprVoid => "void",
            Self::SwitchCase => "switch-case",
        }
    }
}

opcode_table! {
    /// Statement opcodes (void-returning control flow and assignments).
    StmtOp {
        SetLoc = 0 => "set_loc",
        SetGlo = 1 => "set_glo",
        CallInt = 2 => "call_int",
        CallInd = 3 => "call_ind",
        CallImp = 4 => "call_imp",
        Ret = 5 => "ret",
        Block = 6 => "block",
        IfThen = 7 => "if_then",
        IfElse = 8 => "if_else",
        While = 9 => "while",
        Do = 10 => "do",
        Label = 11 => "label",
        Break = 12 => "break",
        BreakLabel = 13 => "break_label",
        Continue = 14 => "continue",
        ContinueLabel = 15 => "continue_label",
        Switch = 16 => "switch",
    }
}

with_imm_selectors! {
    StmtOp {
        SetLoc = 0,
        SetGlo = 1,
    }
}

opcode_table! {
    /// i32 expression opcodes.
    I32Op {
        LitImm = 0 => "lit_imm",
        LitPool = 1 => "lit_pool",
        GetLoc = 2 => "get_loc",
        GetGlo = 3 => "get_glo",
        SetLoc = 4 => "set_loc",
        SetGlo = 5 => "set_glo",
        CallInt = 6 => "call_int",
        CallInd = 7 => "call_ind",
        CallImp = 8 => "call_imp",
        Cond = 9 => "cond",
        Comma = 10 => "comma",
        FromF32 = 11 => "from_f32",
        FromF64 = 12 => "from_f64",
        Neg = 13 => "neg",
        Add = 14 => "add",
        Sub = 15 => "sub",
        Mul = 16 => "mul",
        SDiv = 17 => "sdiv",
        UDiv = 18 => "udiv",
        SRem = 19 => "srem",
        URem = 20 => "urem",
        BitNot = 21 => "bit_not",
        BitOr = 22 => "bit_or",
        BitAnd = 23 => "bit_and",
        BitXor = 24 => "bit_xor",
        Lsh = 25 => "lsh",
        ArithRsh = 26 => "arith_rsh",
        LogicRsh = 27 => "logic_rsh",
        Clz = 28 => "clz",
        LogicNot = 29 => "logic_not",
        EqI32 = 30 => "eq_i32",
        EqF32 = 31 => "eq_f32",
        EqF64 = 32 => "eq_f64",
        NEqI32 = 33 => "neq_i32",
        NEqF32 = 34 => "neq_f32",
        NEqF64 = 35 => "neq_f64",
        SLtI32 = 36 => "slt_i32",
        SLeI32 = 37 => "sle_i32",
        ULtI32 = 38 => "ult_i32",
        ULeI32 = 39 => "ule_i32",
        LtF32 = 40 => "lt_f32",
        LeF32 = 41 => "le_f32",
        LtF64 = 42 => "lt_f64",
        LeF64 = 43 => "le_f64",
        SGtI32 = 44 => "sgt_i32",
        SGeI32 = 45 => "sge_i32",
        UGtI32 = 46 => "ugt_i32",
        UGeI32 = 47 => "uge_i32",
        GtF32 = 48 => "gt_f32",
        GeF32 = 49 => "ge_f32",
        GtF64 = 50 => "gt_f64",
        GeF64 = 51 => "ge_f64",
        SMin = 52 => "smin",
        UMin = 53 => "umin",
        SMax = 54 => "smax",
        UMax = 55 => "umax",
        Abs = 56 => "abs",
    }
}

with_imm_selectors! {
    I32Op {
        LitImm = 0,
        LitPool = 1,
        GetLoc = 2,
    }
}

opcode_table! {
    /// f32 expression opcodes.
    F32Op {
        LitImm = 0 => "lit_imm",
        LitPool = 1 => "lit_pool",
        GetLoc = 2 => "get_loc",
        GetGlo = 3 => "get_glo",
        SetLoc = 4 => "set_loc",
        SetGlo = 5 => "set_glo",
        CallInt = 6 => "call_int",
        CallInd = 7 => "call_ind",
        CallImp = 8 => "call_imp",
        Cond = 9 => "cond",
        Comma = 10 => "comma",
        FromI32 = 11 => "from_i32",
        FromF64 = 12 => "from_f64",
        Neg = 13 => "neg",
        Add = 14 => "add",
        Sub = 15 => "sub",
        Mul = 16 => "mul",
        Div = 17 => "div",
        Abs = 18 => "abs",
        Ceil = 19 => "ceil",
        Floor = 20 => "floor",
        Sqrt = 21 => "sqrt",
    }
}

with_imm_selectors! {
    F32Op {
        LitPool = 0,
        GetLoc = 1,
    }
}

opcode_table! {
    /// f64 expression opcodes.
    F64Op {
        LitImm = 0 => "lit_imm",
        LitPool = 1 => "lit_pool",
        GetLoc = 2 => "get_loc",
        GetGlo = 3 => "get_glo",
        SetLoc = 4 => "set_loc",
        SetGlo = 5 => "set_glo",
        CallInt = 6 => "call_int",
        CallInd = 7 => "call_ind",
        CallImp = 8 => "call_imp",
        Cond = 9 => "cond",
        Comma = 10 => "comma",
        FromI32 = 11 => "from_i32",
        FromF32 = 12 => "from_f32",
        Neg = 13 => "neg",
        Add = 14 => "add",
        Sub = 15 => "sub",
        Mul = 16 => "mul",
        Div = 17 => "div",
        Rem = 18 => "rem",
        Min = 19 => "min",
        Max = 20 => "max",
        Abs = 21 => "abs",
        Ceil = 22 => "ceil",
        Floor = 23 => "floor",
        Sqrt = 24 => "sqrt",
        Cos = 25 => "cos",
        Sin = 26 => "sin",
        Tan = 27 => "tan",
        ACos = 28 => "acos",
        ASin = 29 => "asin",
        ATan = 30 => "atan",
        ATan2 = 31 => "atan2",
        Exp = 32 => "exp",
        Ln = 33 => "ln",
        Pow = 34 => "pow",
    }
}

with_imm_selectors! {
    F64Op {
        LitPool = 0,
        GetLoc = 1,
    }
}

opcode_table! {
    /// Void expression opcodes (calls whose result is discarded while in
    /// expression position). These have no with-immediate forms: the wire
    /// byte is always plain.
    VoidOp {
        CallInt = 0 => "call_int",
        CallInd = 1 => "call_ind",
        CallImp = 2 => "call_imp",
    }
}

impl VoidOp {
    /// Void opcodes have no with-immediate forms, so this is always `None`.
    #[must_use]
    pub fn imm_selector(self) -> Option<u8> {
        None
    }
}

opcode_table! {
    /// Switch-case shape bytes.
    SwitchCaseOp {
        Case0 = 0 => "case0",
        Case1 = 1 => "case1",
        CaseN = 2 => "case_n",
        Default0 = 3 => "default0",
        Default1 = 4 => "default1",
        DefaultN = 5 => "default_n",
    }
}

opcode_table! {
    /// Export descriptor format bytes.
    ExportFormat {
        Default = 0 => "default",
        Record = 1 => "record",
    }
}

/// An opcode from any kind's table, tagged with its kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnyOp {
    /// A statement opcode.
    Stmt(StmtOp),
    /// An i32 expression opcode.
    I32(I32Op),
    /// An f32 expression opcode.
    F32(F32Op),
    /// An f64 expression opcode.
    F64(F64Op),
    /// A void expression opcode.
    Void(VoidOp),
}

impl AnyOp {
    /// The kind whose table this opcode belongs to.
    #[must_use]
    pub fn kind(self) -> Kind {
        match self {
            Self::Stmt(_) => Kind::Stmt,
            Self::I32(_) => Kind::ExprI32,
            Self::F32(_) => Kind::ExprF32,
            Self::F64(_) => Kind::ExprF64,
            Self::Void(_) => Kind::ExprVoid,
        }
    }

    /// The plain opcode byte.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Stmt(op) => op.byte(),
            Self::I32(op) => op.byte(),
            Self::F32(op) => op.byte(),
            Self::F64(op) => op.byte(),
            Self::Void(op) => op.byte(),
        }
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stmt(op) => op.name(),
            Self::I32(op) => op.name(),
            Self::F32(op) => op.name(),
            Self::F64(op) => op.name(),
            Self::Void(op) => op.name(),
        }
    }

    /// The packed with-immediate selector, if this opcode has one.
    #[must_use]
    pub fn imm_selector(self) -> Option<u8> {
        match self {
            Self::Stmt(op) => op.imm_selector(),
            Self::I32(op) => op.imm_selector(),
            Self::F32(op) => op.imm_selector(),
            Self::F64(op) => op.imm_selector(),
            Self::Void(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_are_stable() {
        assert_eq!(StmtOp::Ret.byte(), 5);
        assert_eq!(StmtOp::Switch.byte(), 16);
        assert_eq!(I32Op::Add.byte(), 14);
        assert_eq!(I32Op::GetLoc.byte(), 2);
        assert_eq!(I32Op::Abs.byte(), 56);
        assert_eq!(F32Op::Sqrt.byte(), 21);
        assert_eq!(F64Op::Pow.byte(), 34);
        assert_eq!(VoidOp::CallImp.byte(), 2);
        assert_eq!(SwitchCaseOp::DefaultN.byte(), 5);
    }

    #[test]
    fn all_plain_opcodes_fit_below_the_packed_bit() {
        for b in 0..=u8::MAX {
            if StmtOp::from_u8(b).is_some()
                || I32Op::from_u8(b).is_some()
                || F32Op::from_u8(b).is_some()
                || F64Op::from_u8(b).is_some()
                || VoidOp::from_u8(b).is_some()
            {
                assert!(b < 0x80, "opcode byte {b:#04x} collides with the packed bit");
            }
        }
    }

    #[test]
    fn selector_mappings_are_bidirectional() {
        for sel in 0u8..4 {
            if let Some(op) = I32Op::from_selector(sel) {
                assert_eq!(op.imm_selector(), Some(sel));
            }
            if let Some(op) = StmtOp::from_selector(sel) {
                assert_eq!(op.imm_selector(), Some(sel));
            }
            if let Some(op) = F32Op::from_selector(sel) {
                assert_eq!(op.imm_selector(), Some(sel));
            }
            if let Some(op) = F64Op::from_selector(sel) {
                assert_eq!(op.imm_selector(), Some(sel));
            }
        }
        assert_eq!(I32Op::Add.imm_selector(), None);
        assert_eq!(StmtOp::Ret.imm_selector(), None);
        assert_eq!(F64Op::Sqrt.imm_selector(), None);
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert_eq!(StmtOp::from_u8(17), None);
        assert_eq!(I32Op::from_u8(57), None);
        assert_eq!(VoidOp::from_u8(3), None);
        assert_eq!(SwitchCaseOp::from_u8(6), None);
        assert_eq!(ExportFormat::from_u8(2), None);
    }
}
