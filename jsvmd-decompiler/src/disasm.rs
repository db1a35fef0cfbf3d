//! Sequential instruction decoding.
//!
//! One pass over the decoded byte stream: opcode byte, canonical
//! translation through the payload's map, operands per the canonical
//! schema (version-sensitive for `BUILD_REGEXP` and `TRY_PUSH`). Nested
//! `BUILD_FUNCTION` bodies are captured raw here and re-disassembled by the
//! lifter with the same map, strings, and version.

use byteorder::{ByteOrder, LittleEndian};
use jsvmd_ir::instruction::{Arg, ArgValue, Instruction};
use jsvmd_isa::{ArgKind, Op, OpcodeMap, Version};

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn u8(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = LittleEndian::read_u32(&self.bytes[self.pos..]);
        self.pos += 4;
        Some(v)
    }

    fn f64(&mut self) -> Option<f64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = LittleEndian::read_f64(&self.bytes[self.pos..]);
        self.pos += 8;
        Some(v)
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Some(s)
    }
}

/// Disassemble one function body. Decoding is deterministic; an operand
/// read past end of stream attaches an error to the instruction and halts
/// this body, keeping everything decoded so far.
pub fn disassemble(
    bytes: &[u8],
    map: &OpcodeMap,
    strings: &[String],
    version: Version,
) -> Vec<Instruction> {
    let mut r = Reader { bytes, pos: 0 };
    let mut out: Vec<Instruction> = Vec::new();

    while r.remaining() > 0 {
        let addr = r.pos as u32;
        let opcode = r.u8().expect("remaining > 0");
        let op = map.get(opcode);
        let mut insn = Instruction::new(addr, opcode, op);

        let Some(op) = op else {
            log::warn!("unknown opcode {opcode} at {addr:#06x}");
            out.push(insn);
            continue;
        };

        if let Err(msg) = decode_operands(&mut r, &mut insn, op, map, strings, version) {
            insn.error = Some(msg);
            out.push(insn);
            break;
        }
        out.push(insn);
    }

    // Jump targets must land on decoded instruction boundaries (diagnostic
    // only; the CFG builder drops the edge).
    let addrs: std::collections::BTreeSet<u32> = out.iter().map(|i| i.addr).collect();
    for insn in &mut out {
        if let Some(target) = insn.jump_target() {
            if !addrs.contains(&target) {
                insn.error = Some(format!("jump target {target:#06x} is not an instruction"));
            }
        }
    }

    out
}

fn decode_operands(
    r: &mut Reader,
    insn: &mut Instruction,
    op: Op,
    map: &OpcodeMap,
    strings: &[String],
    version: Version,
) -> Result<(), String> {
    for &kind in op.operand_schema(version) {
        let value = read_arg(r, kind)
            .ok_or_else(|| format!("operand {kind:?} runs past end of stream"))?;

        if kind == ArgKind::StringIndex && insn.string_value.is_none() {
            let idx = value.as_u32() as usize;
            match strings.get(idx) {
                Some(s) => insn.string_value = Some(s.clone()),
                None => log::warn!(
                    "string index {idx} out of range ({} entries) at {:#06x}",
                    strings.len(),
                    insn.addr
                ),
            }
        }

        insn.args.push(Arg { kind, value });
    }

    // ASSIGN_VARIABLE with is_op = 1 carries one embedded compound opcode
    // byte, translated through the same map.
    if op == Op::AssignVar && insn.arg_u32(ArgKind::IsOp) == Some(1) {
        let raw = r.u8().ok_or("compound opcode runs past end of stream")?;
        let assign_op = map
            .get(raw)
            .ok_or_else(|| format!("compound opcode {raw} is unmapped"))?;
        insn.args.push(Arg {
            kind: ArgKind::AssignOp,
            value: ArgValue::Op(assign_op),
        });
    }

    // BUILD_FUNCTION: the length operand is followed by that many raw bytes
    // of nested payload.
    if op == Op::BuildFunction {
        let len = insn.arg_u32(ArgKind::Length).unwrap_or(0) as usize;
        let body = r
            .take(len)
            .ok_or_else(|| format!("function body of {len} bytes runs past end of stream"))?;
        insn.fn_body = Some(body.to_vec());
    }

    Ok(())
}

fn read_arg(r: &mut Reader, kind: ArgKind) -> Option<ArgValue> {
    Some(match kind {
        ArgKind::Boolean => ArgValue::Bool(r.u8()? != 0),
        ArgKind::HasValue | ArgKind::HasFlags | ArgKind::Prefix | ArgKind::IsOp => {
            ArgValue::U32(r.u8()? as u32)
        }
        ArgKind::SignedDword => ArgValue::I32(r.u32()? as i32),
        ArgKind::Double => ArgValue::F64(r.f64()?),
        ArgKind::StringIndex
        | ArgKind::Dword
        | ArgKind::Address
        | ArgKind::Argc
        | ArgKind::Length
        | ArgKind::Scope
        | ArgKind::Dest
        | ArgKind::VarSlot
        | ArgKind::CatchAddr
        | ArgKind::FinallyAddr => ArgValue::U32(r.u32()?),
        // Only ever appended by the ASSIGN_VARIABLE special case.
        ArgKind::AssignOp => return None,
    })
}
