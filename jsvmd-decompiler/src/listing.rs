//! Human-readable disassembly listings.

use std::fmt::Write;

use jsvmd_ir::instruction::{ArgValue, Instruction};

/// Render `addr  MNEMONIC operands` lines for a disassembled body.
pub fn render(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for insn in instructions {
        let _ = write!(out, "{:#06x}  {}", insn.addr, insn.name());
        for arg in &insn.args {
            let text = match &arg.value {
                ArgValue::U32(v) => format!("{v}"),
                ArgValue::I32(v) => format!("{v}"),
                ArgValue::F64(v) => format!("{v}"),
                ArgValue::Bool(v) => format!("{v}"),
                ArgValue::Op(op) => op.mnemonic().to_string(),
            };
            let _ = write!(out, " {:?}={text}", arg.kind);
        }
        if let Some(s) = &insn.string_value {
            let _ = write!(out, "  ; \"{s}\"");
        }
        if let Some(e) = &insn.error {
            let _ = write!(out, "  ; error: {e}");
        }
        out.push('\n');
    }
    out
}
