//! Canonical instruction set of the stack-VM obfuscator.
//!
//! The obfuscator shuffles opcode numbers per payload, so nothing here deals
//! in raw numbers: this crate defines the fixed set of *semantic* operations,
//! their operand schemas (version-sensitive for a handful of instructions),
//! and the per-payload [`OpcodeMap`] that ties shuffled numbers back to them.

mod map;
mod version;

pub use map::{MapFile, OpcodeMap, SwappedOpcodes};
pub use version::Version;

/// Canonical opcode. One variant per semantic operation of the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Stack pushes
    PushString,
    PushInt,
    PushDouble,
    PushBool,
    PushNull,
    PushUndefined,
    Dup,
    Pop,
    // Binary arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparisons
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    // Relational keywords
    In,
    InstanceOf,
    // Unary
    UnaryPlus,
    UnaryMinus,
    UnaryNot,
    UnaryBitNot,
    TypeOf,
    Void,
    Throw,
    // Updates on variables (pre/post are distinct opcodes)
    IncVarPre,
    IncVarPost,
    DecVarPre,
    DecVarPost,
    // Updates on property / computed-property targets (pre/post is an operand)
    IncProperty,
    DecProperty,
    IncComputed,
    DecComputed,
    // Variables
    LoadVar,
    StoreVar,
    AssignVar,
    // Context loads
    LoadGlobal,
    LoadGlobalProp,
    LoadThis,
    LoadArgument,
    LoadArguments,
    // Calls
    CallFunction,
    CallMethod,
    Construct,
    // Properties
    GetProp,
    SetProp,
    // Builders
    BuildArray,
    BuildObject,
    BuildFunction,
    BuildRegexp,
    // Control transfers
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    Return,
    Debugger,
    // Exception regions
    TryPush,
    TryPop,
    TryCatch,
    TryFinally,
    // Comma-expression bookkeeping
    SeqPop,
}

/// Kind of a decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    StringIndex,
    Dword,
    SignedDword,
    Double,
    Boolean,
    Address,
    Argc,
    Length,
    HasValue,
    HasFlags,
    Scope,
    Dest,
    Prefix,
    IsOp,
    AssignOp,
    CatchAddr,
    FinallyAddr,
    VarSlot,
}

impl ArgKind {
    /// Encoded width in bytes. `AssignOp` is conditional (see the
    /// disassembler) and `Double` is an IEEE 754 LE read.
    pub fn width(self) -> usize {
        match self {
            ArgKind::Boolean
            | ArgKind::HasValue
            | ArgKind::HasFlags
            | ArgKind::Prefix
            | ArgKind::IsOp
            | ArgKind::AssignOp => 1,
            ArgKind::Double => 8,
            _ => 4,
        }
    }
}

impl Op {
    /// Canonical mnemonic, as it appears in disassembly listings and
    /// opcode-map exchange files.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::PushString => "PUSH_STRING",
            Op::PushInt => "PUSH_INT",
            Op::PushDouble => "PUSH_DOUBLE",
            Op::PushBool => "PUSH_BOOL",
            Op::PushNull => "PUSH_NULL",
            Op::PushUndefined => "PUSH_UNDEFINED",
            Op::Dup => "STACK_PUSH_DUPLICATE",
            Op::Pop => "STACK_POP",
            Op::Add => "ADD",
            Op::Sub => "SUB",
            Op::Mul => "MUL",
            Op::Div => "DIV",
            Op::Mod => "MOD",
            Op::Less => "LESS",
            Op::LessEqual => "LESS_EQUAL",
            Op::Greater => "GREATER",
            Op::GreaterEqual => "GREATER_EQUAL",
            Op::Equal => "EQUAL",
            Op::StrictEqual => "STRICT_EQUAL",
            Op::NotEqual => "NOT_EQUAL",
            Op::StrictNotEqual => "STRICT_NOT_EQUAL",
            Op::BitAnd => "BIT_AND",
            Op::BitOr => "BIT_OR",
            Op::BitXor => "BIT_XOR",
            Op::Shl => "SHIFT_LEFT",
            Op::Shr => "SHIFT_RIGHT",
            Op::Ushr => "SHIFT_RIGHT_UNSIGNED",
            Op::In => "IN",
            Op::InstanceOf => "INSTANCEOF",
            Op::UnaryPlus => "UNARY_PLUS",
            Op::UnaryMinus => "UNARY_MINUS",
            Op::UnaryNot => "UNARY_NOT",
            Op::UnaryBitNot => "UNARY_BIT_NOT",
            Op::TypeOf => "TYPEOF",
            Op::Void => "VOID",
            Op::Throw => "UNARY_THROW",
            Op::IncVarPre => "INC_VARIABLE_PRE",
            Op::IncVarPost => "INC_VARIABLE_POST",
            Op::DecVarPre => "DEC_VARIABLE_PRE",
            Op::DecVarPost => "DEC_VARIABLE_POST",
            Op::IncProperty => "INC_PROPERTY",
            Op::DecProperty => "DEC_PROPERTY",
            Op::IncComputed => "INC_COMPUTED",
            Op::DecComputed => "DEC_COMPUTED",
            Op::LoadVar => "LOAD_VARIABLE",
            Op::StoreVar => "STORE_VARIABLE",
            Op::AssignVar => "ASSIGN_VARIABLE",
            Op::LoadGlobal => "LOAD_GLOBAL",
            Op::LoadGlobalProp => "LOAD_GLOBAL_PROPERTY",
            Op::LoadThis => "LOAD_THIS",
            Op::LoadArgument => "LOAD_ARGUMENT",
            Op::LoadArguments => "LOAD_ARGUMENTS",
            Op::CallFunction => "CALL_FUNCTION",
            Op::CallMethod => "CALL_METHOD",
            Op::Construct => "CONSTRUCT",
            Op::GetProp => "GET_PROPERTY",
            Op::SetProp => "SET_PROPERTY",
            Op::BuildArray => "BUILD_ARRAY",
            Op::BuildObject => "BUILD_OBJECT",
            Op::BuildFunction => "BUILD_FUNCTION",
            Op::BuildRegexp => "BUILD_REGEXP",
            Op::Jump => "JUMP",
            Op::JumpIfTrue => "JUMP_IF_TRUE",
            Op::JumpIfFalse => "JUMP_IF_FALSE",
            Op::Return => "RETURN",
            Op::Debugger => "DEBUGGER",
            Op::TryPush => "TRY_PUSH",
            Op::TryPop => "TRY_POP",
            Op::TryCatch => "TRY_CATCH",
            Op::TryFinally => "TRY_FINALLY",
            Op::SeqPop => "SEQUENCE_POP",
        }
    }

    /// Inverse of [`Op::mnemonic`], used when loading map exchange files.
    pub fn from_mnemonic(s: &str) -> Option<Op> {
        ALL_OPS.iter().copied().find(|op| op.mnemonic() == s)
    }

    /// Operand schema for this opcode. `BUILD_REGEXP` and `TRY_PUSH` differ
    /// between the two wire-format families.
    pub fn operand_schema(self, version: Version) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Op::PushString => &[StringIndex],
            Op::PushInt => &[SignedDword],
            Op::PushDouble => &[Double],
            Op::PushBool => &[Boolean],
            Op::IncVarPre | Op::IncVarPost | Op::DecVarPre | Op::DecVarPost => &[Scope, VarSlot],
            Op::IncProperty | Op::DecProperty => &[Prefix, StringIndex],
            Op::IncComputed | Op::DecComputed => &[Prefix],
            Op::LoadVar | Op::StoreVar => &[Scope, VarSlot],
            // is_op = 1 is followed by one embedded AssignOp byte; the
            // disassembler appends it after reading this fixed part.
            Op::AssignVar => &[IsOp, Scope, Dest],
            Op::LoadGlobalProp => &[StringIndex],
            Op::LoadArgument => &[Dword],
            Op::CallFunction | Op::CallMethod | Op::Construct => &[Argc],
            Op::BuildArray | Op::BuildObject | Op::BuildFunction => &[Length],
            Op::BuildRegexp => match version {
                Version::V1Legacy => &[StringIndex, StringIndex],
                Version::V2Current => &[HasFlags],
            },
            Op::Jump | Op::JumpIfTrue | Op::JumpIfFalse => &[Address],
            Op::Return => &[HasValue],
            Op::TryPush => match version {
                Version::V1Legacy => &[CatchAddr, FinallyAddr],
                Version::V2Current => &[CatchAddr],
            },
            _ => &[],
        }
    }

    /// Arithmetic, comparison, bitwise, or relational-keyword binary op.
    pub fn is_binary(self) -> bool {
        self.binary_operator().is_some()
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::Less
                | Op::LessEqual
                | Op::Greater
                | Op::GreaterEqual
                | Op::Equal
                | Op::StrictEqual
                | Op::NotEqual
                | Op::StrictNotEqual
        )
    }

    /// Source-level operator token for binary opcodes.
    pub fn binary_operator(self) -> Option<&'static str> {
        Some(match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Less => "<",
            Op::LessEqual => "<=",
            Op::Greater => ">",
            Op::GreaterEqual => ">=",
            Op::Equal => "==",
            Op::StrictEqual => "===",
            Op::NotEqual => "!=",
            Op::StrictNotEqual => "!==",
            Op::BitAnd => "&",
            Op::BitOr => "|",
            Op::BitXor => "^",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Ushr => ">>>",
            Op::In => "in",
            Op::InstanceOf => "instanceof",
            _ => return None,
        })
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jump | Op::JumpIfTrue | Op::JumpIfFalse)
    }

    pub fn is_conditional_jump(self) -> bool {
        matches!(self, Op::JumpIfTrue | Op::JumpIfFalse)
    }

    /// Opcodes that consume the value left on the stack by the instruction
    /// before them. The lifter uses this to decide whether a call result
    /// becomes an expression statement or stays on the symbolic stack.
    pub fn consumes_result(self) -> bool {
        self.is_binary()
            || matches!(
                self,
                Op::GetProp
                    | Op::SetProp
                    | Op::CallMethod
                    | Op::StoreVar
                    | Op::AssignVar
                    | Op::UnaryPlus
                    | Op::UnaryMinus
                    | Op::UnaryNot
                    | Op::UnaryBitNot
                    | Op::TypeOf
                    | Op::Void
                    | Op::Throw
                    | Op::Pop
                    | Op::Dup
                    | Op::SeqPop
                    | Op::JumpIfTrue
                    | Op::JumpIfFalse
            )
    }

    /// Instructions that only build an expression value: these are the ones
    /// allowed inside ternary branches and short-circuit tails.
    pub fn is_pure_expression(self) -> bool {
        !matches!(
            self,
            Op::StoreVar | Op::SetProp | Op::Throw | Op::Return | Op::Debugger
        )
    }
}

/// Every canonical opcode, in declaration order.
pub const ALL_OPS: [Op; 71] = [
    Op::PushString,
    Op::PushInt,
    Op::PushDouble,
    Op::PushBool,
    Op::PushNull,
    Op::PushUndefined,
    Op::Dup,
    Op::Pop,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::Div,
    Op::Mod,
    Op::Less,
    Op::LessEqual,
    Op::Greater,
    Op::GreaterEqual,
    Op::Equal,
    Op::StrictEqual,
    Op::NotEqual,
    Op::StrictNotEqual,
    Op::BitAnd,
    Op::BitOr,
    Op::BitXor,
    Op::Shl,
    Op::Shr,
    Op::Ushr,
    Op::In,
    Op::InstanceOf,
    Op::UnaryPlus,
    Op::UnaryMinus,
    Op::UnaryNot,
    Op::UnaryBitNot,
    Op::TypeOf,
    Op::Void,
    Op::Throw,
    Op::IncVarPre,
    Op::IncVarPost,
    Op::DecVarPre,
    Op::DecVarPost,
    Op::IncProperty,
    Op::DecProperty,
    Op::IncComputed,
    Op::DecComputed,
    Op::LoadVar,
    Op::StoreVar,
    Op::AssignVar,
    Op::LoadGlobal,
    Op::LoadGlobalProp,
    Op::LoadThis,
    Op::LoadArgument,
    Op::LoadArguments,
    Op::CallFunction,
    Op::CallMethod,
    Op::Construct,
    Op::GetProp,
    Op::SetProp,
    Op::BuildArray,
    Op::BuildObject,
    Op::BuildFunction,
    Op::BuildRegexp,
    Op::Jump,
    Op::JumpIfTrue,
    Op::JumpIfFalse,
    Op::Return,
    Op::Debugger,
    Op::TryPush,
    Op::TryPop,
    Op::TryCatch,
    Op::TryFinally,
    Op::SeqPop,
];

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in ALL_OPS {
            assert!(seen.insert(op.mnemonic()), "duplicate {}", op.mnemonic());
        }
    }

    #[test]
    fn mnemonic_roundtrip() {
        for op in ALL_OPS {
            assert_eq!(Op::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(Op::from_mnemonic("NO_SUCH_OP"), None);
    }

    #[test]
    fn version_sensitive_schemas() {
        assert_eq!(
            Op::BuildRegexp.operand_schema(Version::V1Legacy),
            &[ArgKind::StringIndex, ArgKind::StringIndex]
        );
        assert_eq!(
            Op::BuildRegexp.operand_schema(Version::V2Current),
            &[ArgKind::HasFlags]
        );
        assert_eq!(
            Op::TryPush.operand_schema(Version::V1Legacy),
            &[ArgKind::CatchAddr, ArgKind::FinallyAddr]
        );
        assert_eq!(
            Op::TryPush.operand_schema(Version::V2Current),
            &[ArgKind::CatchAddr]
        );
    }

    #[test]
    fn binary_ops_have_operators() {
        for op in ALL_OPS {
            assert_eq!(op.is_binary(), op.binary_operator().is_some());
        }
        assert_eq!(Op::Sub.binary_operator(), Some("-"));
        assert_eq!(Op::InstanceOf.binary_operator(), Some("instanceof"));
    }
}
