use jsvmd_isa::{ArgKind, Op};

/// A decoded operand value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    U32(u32),
    I32(i32),
    F64(f64),
    Bool(bool),
    /// An embedded opcode, already translated through the payload's map
    /// (the compound-assign byte of `ASSIGN_VARIABLE`).
    Op(Op),
}

impl ArgValue {
    pub fn as_u32(&self) -> u32 {
        match self {
            ArgValue::U32(v) => *v,
            ArgValue::I32(v) => *v as u32,
            ArgValue::Bool(b) => *b as u32,
            _ => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.as_u32() != 0
    }
}

/// One typed operand entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub kind: ArgKind,
    pub value: ArgValue,
}

/// A single decoded instruction. Immutable after disassembly.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Byte offset in the decoded stream; also the jump identifier.
    pub addr: u32,
    /// Raw shuffled opcode number.
    pub opcode: u8,
    /// Canonical operation, when the opcode map resolves the number.
    pub op: Option<Op>,
    pub args: Vec<Arg>,
    /// Resolved string-table entry for the first string-index operand.
    pub string_value: Option<String>,
    /// Raw nested payload of a `BUILD_FUNCTION`.
    pub fn_body: Option<Vec<u8>>,
    /// Disassembly diagnostic; set on operand underrun or a dangling jump.
    pub error: Option<String>,
}

impl Instruction {
    pub fn new(addr: u32, opcode: u8, op: Option<Op>) -> Self {
        Instruction {
            addr,
            opcode,
            op,
            args: Vec::new(),
            string_value: None,
            fn_body: None,
            error: None,
        }
    }

    /// Symbolic name: the canonical mnemonic or `UNKNOWN_<n>`.
    pub fn name(&self) -> String {
        match self.op {
            Some(op) => op.mnemonic().to_string(),
            None => format!("UNKNOWN_{}", self.opcode),
        }
    }

    pub fn is(&self, op: Op) -> bool {
        self.op == Some(op)
    }

    pub fn is_jump(&self) -> bool {
        self.op.is_some_and(Op::is_jump)
    }

    pub fn is_conditional_jump(&self) -> bool {
        self.op.is_some_and(Op::is_conditional_jump)
    }

    pub fn arg(&self, kind: ArgKind) -> Option<&ArgValue> {
        self.args.iter().find(|a| a.kind == kind).map(|a| &a.value)
    }

    pub fn arg_u32(&self, kind: ArgKind) -> Option<u32> {
        self.arg(kind).map(ArgValue::as_u32)
    }

    /// Target address of a jump instruction.
    pub fn jump_target(&self) -> Option<u32> {
        if self.is_jump() {
            self.arg_u32(ArgKind::Address)
        } else {
            None
        }
    }
}
