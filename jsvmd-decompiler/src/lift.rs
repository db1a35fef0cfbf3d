//! Symbolic stack lifting: a single forward pass over the instruction
//! stream, driven by the pre-computed region maps.
//!
//! Stack values are opaque source-expression strings, pre-parenthesized so
//! they splice into larger expressions without precedence bookkeeping.
//! Branches are lifted against value-copies of the stack.

use jsvmd_ir::cfg::{BlockId, Cfg};
use jsvmd_ir::instruction::Instruction;
use jsvmd_ir::regions::{self, IfElseRegion, LogicalRegion, LoopPattern, LoopRegion, Regions, TryCatchRegion};
use jsvmd_ir::{dom, ArgValue};
use jsvmd_isa::{ArgKind, Op, OpcodeMap, SwappedOpcodes, Version};

use crate::disasm;
use crate::emit::{self, escape_js_string, is_safe_identifier, line};

/// Lift a disassembled body to source text.
pub fn lift_program(
    insns: &[Instruction],
    strings: &[String],
    map: &OpcodeMap,
    swapped: &SwappedOpcodes,
    version: Version,
) -> String {
    let cfg = Cfg::build(insns);
    let dominators = dom::analyze(&cfg);
    let regions = regions::recognize(insns, &cfg, &dominators);

    let mut lifter = Lifter {
        insns,
        cfg: &cfg,
        regions: &regions,
        strings,
        map,
        swapped,
        version,
        names: VarNamer::new(0, 0),
    };

    let mut out = Vec::new();
    let mut stack = Vec::new();
    lifter.lift_range(0, insns.len(), &mut stack, &mut out, 0, None);
    emit::finish(out)
}

/// `(scopeId, varSlot) -> var_N` bijection, created on first sight. Fresh
/// per function body; the counter is inherited by nested bodies so names
/// never collide across nesting levels.
struct VarNamer {
    map: std::collections::HashMap<(u32, u32), String>,
    counter: u32,
    unknown_counter: u32,
}

impl VarNamer {
    fn new(counter: u32, unknown_counter: u32) -> Self {
        VarNamer {
            map: std::collections::HashMap::new(),
            counter,
            unknown_counter,
        }
    }

    fn resolve(&mut self, scope: u32, slot: u32) -> String {
        let scope_bad = scope > 1000;
        let slot_bad = slot > 10000;
        if scope_bad && slot_bad {
            let n = self.unknown_counter;
            self.unknown_counter += 1;
            return format!("var_unknown_{n}");
        }
        let key = (
            if scope_bad { 0 } else { scope },
            if slot_bad { 0 } else { slot },
        );
        if let Some(name) = self.map.get(&key) {
            return name.clone();
        }
        let name = format!("var_{}", self.counter);
        self.counter += 1;
        self.map.insert(key, name.clone());
        name
    }
}

fn pop_or(stack: &mut Vec<String>, default: &str) -> String {
    stack.pop().unwrap_or_else(|| default.to_string())
}

struct Lifter<'a> {
    insns: &'a [Instruction],
    cfg: &'a Cfg,
    regions: &'a Regions,
    strings: &'a [String],
    map: &'a OpcodeMap,
    swapped: &'a SwappedOpcodes,
    version: Version,
    names: VarNamer,
}

impl<'a> Lifter<'a> {
    /// Lift `[start, end)`. The dispatch priority per instruction: loop
    /// entry, loop-condition skip, logical region, ternary, if/else, plain
    /// instruction. A pending `return` snapshot is emitted as the last line
    /// of the range.
    fn lift_range(
        &mut self,
        start: usize,
        end: usize,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
        indent: usize,
        suppress_loop_at: Option<usize>,
    ) {
        let end = end.min(self.insns.len());
        let mut idx = start;
        let mut pending_return: Option<String> = None;

        while idx < end {
            if Some(idx) != suppress_loop_at {
                if let Some(lp) = self.regions.loop_at_entry(idx).cloned() {
                    self.lift_loop(&lp, stack, out, indent);
                    idx = lp.exit_idx;
                    continue;
                }
            }

            // A loop's conditional consumed by a region; nothing to do if
            // control falls onto it outside its loop.
            if self.regions.is_loop_cond_jump(idx) {
                idx += 1;
                continue;
            }

            if let Some(lg) = self.regions.logical_at(idx).cloned() {
                self.lift_logical(&lg, stack, out, indent);
                idx = lg.target_idx;
                continue;
            }

            if let Some(region) = self.regions.conditional_at_jump(idx).cloned() {
                self.lift_conditional(&region, stack, out, indent);
                idx = self.cfg.blocks[region.merge_block].start_idx.max(idx + 1);
                continue;
            }

            if let Some(tr) = self.regions.try_at(idx).cloned() {
                self.lift_try(&tr, out, indent);
                idx = tr.continue_idx.max(idx + 1);
                continue;
            }

            self.process(idx, stack, out, indent, &mut pending_return);
            idx += 1;
        }

        if let Some(ret) = pending_return {
            line(out, indent, &ret);
        }
    }

    fn lift_loop(
        &mut self,
        lp: &LoopRegion,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
        indent: usize,
    ) {
        let mut cond_stack = stack.clone();
        self.lift_range(
            lp.cond_start,
            lp.cond_jump_idx,
            &mut cond_stack,
            out,
            indent,
            Some(lp.entry_idx()),
        );
        let cond = pop_or(&mut cond_stack, "true");

        // V1 loops back when the condition holds; V2 exits when it holds.
        let negate = match lp.pattern {
            LoopPattern::V1PostTest => !lp.is_true,
            LoopPattern::V2PreTest => lp.is_true,
        };
        let cond = if negate { format!("(!{cond})") } else { cond };

        line(out, indent, &format!("while ({cond}) {{"));
        let mut body_stack = Vec::new();
        self.lift_range(
            lp.body_start,
            lp.body_end,
            &mut body_stack,
            out,
            indent + 1,
            None,
        );
        line(out, indent, "}");
    }

    fn lift_logical(
        &mut self,
        lg: &LogicalRegion,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
        indent: usize,
    ) {
        let left = pop_or(stack, "0");
        let mut right_stack = stack.clone();
        self.lift_range(
            lg.right_start,
            lg.right_end,
            &mut right_stack,
            out,
            indent,
            None,
        );
        let right = pop_or(&mut right_stack, "0");
        stack.push(format!("({left} {} {right})", lg.operator));
    }

    fn lift_conditional(
        &mut self,
        region: &IfElseRegion,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
        indent: usize,
    ) {
        let cond = pop_or(stack, "false");

        if region.ternary {
            let (ts, te) = self.branch_range(&region.true_blocks);
            let (fs, fe) = self.branch_range(&region.false_blocks);
            let mut true_stack = stack.clone();
            self.lift_range(ts, te, &mut true_stack, out, indent, None);
            let t = pop_or(&mut true_stack, "undefined");
            let mut false_stack = stack.clone();
            self.lift_range(fs, fe, &mut false_stack, out, indent, None);
            let f = pop_or(&mut false_stack, "undefined");
            stack.push(format!("({cond} ? {t} : {f})"));
            return;
        }

        line(out, indent, &format!("if ({cond}) {{"));
        if !region.true_blocks.is_empty() {
            let (ts, te) = self.branch_range(&region.true_blocks);
            let mut branch_stack = stack.clone();
            self.lift_range(ts, te, &mut branch_stack, out, indent + 1, None);
        }
        if !region.false_blocks.is_empty() {
            line(out, indent, "} else {");
            let (fs, fe) = self.branch_range(&region.false_blocks);
            let mut branch_stack = stack.clone();
            self.lift_range(fs, fe, &mut branch_stack, out, indent + 1, None);
        }
        line(out, indent, "}");
    }

    fn lift_try(&mut self, tr: &TryCatchRegion, out: &mut Vec<String>, indent: usize) {
        line(out, indent, "try {");
        let mut try_stack = Vec::new();
        self.lift_range(tr.try_start, tr.try_end, &mut try_stack, out, indent + 1, None);

        line(out, indent, "} catch (e) {");
        let mut catch_stack = Vec::new();
        self.lift_range(
            tr.catch_start,
            tr.catch_end,
            &mut catch_stack,
            out,
            indent + 1,
            None,
        );

        if let (Some(fs), Some(fe)) = (tr.finally_start, tr.finally_end) {
            line(out, indent, "} finally {");
            let mut finally_stack = Vec::new();
            self.lift_range(fs, fe, &mut finally_stack, out, indent + 1, None);
        }
        line(out, indent, "}");
    }

    /// Instruction range covered by a branch's blocks, with the terminal
    /// jump to the merge stripped.
    fn branch_range(&self, blocks: &[BlockId]) -> (usize, usize) {
        let start = blocks
            .iter()
            .map(|&b| self.cfg.blocks[b].start_idx)
            .min()
            .unwrap_or(0);
        let mut end = blocks
            .iter()
            .map(|&b| self.cfg.blocks[b].end_idx)
            .max()
            .unwrap_or(0);
        if end > start && self.insns[end - 1].is(Op::Jump) {
            end -= 1;
        }
        (start, end)
    }

    fn string_at(&self, index: u32) -> String {
        self.strings
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| format!("__string_{index}"))
    }

    /// Property access text: dotted when the popped key is a safe
    /// identifier string literal, bracketed otherwise.
    fn property_text(object: &str, key: &str) -> String {
        if let Some(inner) = key.strip_prefix('"').and_then(|k| k.strip_suffix('"')) {
            if is_safe_identifier(inner) {
                return format!("{object}.{inner}");
            }
        }
        format!("{object}[{key}]")
    }

    /// Does the instruction after `idx` consume a value left on the stack?
    fn next_consumes_result(&self, idx: usize) -> bool {
        match self.insns.get(idx + 1) {
            None => false,
            Some(next) => match next.op {
                Some(Op::Return) => next.arg_u32(ArgKind::HasValue).unwrap_or(0) == 1,
                Some(op) => op.consumes_result(),
                None => false,
            },
        }
    }

    fn process(
        &mut self,
        idx: usize,
        stack: &mut Vec<String>,
        out: &mut Vec<String>,
        indent: usize,
        pending_return: &mut Option<String>,
    ) {
        let insn = &self.insns[idx];

        if let Some(err) = &insn.error {
            line(out, indent, &format!("/* Error: {err} */"));
            return;
        }

        let Some(op) = insn.op else {
            line(out, indent, &format!("/* {} */", insn.name()));
            return;
        };

        match op {
            Op::PushString => {
                let s = insn
                    .string_value
                    .clone()
                    .unwrap_or_else(|| self.string_at(insn.arg_u32(ArgKind::StringIndex).unwrap_or(0)));
                stack.push(format!("\"{}\"", escape_js_string(&s)));
            }
            Op::PushInt => {
                let v = match insn.arg(ArgKind::SignedDword) {
                    Some(ArgValue::I32(v)) => *v,
                    _ => 0,
                };
                stack.push(v.to_string());
            }
            Op::PushDouble => {
                let v = match insn.arg(ArgKind::Double) {
                    Some(ArgValue::F64(v)) => *v,
                    _ => 0.0,
                };
                stack.push(format_double(v));
            }
            Op::PushBool => {
                let v = insn.arg(ArgKind::Boolean).map(ArgValue::as_bool).unwrap_or(false);
                stack.push(v.to_string());
            }
            Op::PushNull => stack.push("null".to_string()),
            Op::PushUndefined => stack.push("undefined".to_string()),
            Op::Dup => {
                let top = stack.last().cloned().unwrap_or_else(|| "undefined".to_string());
                stack.push(top);
            }
            Op::Pop => {
                if let Some(v) = stack.pop() {
                    line(out, indent, &format!("{v};"));
                }
            }
            Op::SeqPop => {
                let last = pop_or(stack, "undefined");
                let first = pop_or(stack, "undefined");
                stack.push(format!("({first}, {last})"));
            }

            _ if op.is_binary() => {
                let tok = op.binary_operator().expect("binary opcode");
                let (first_default, second_default) = binary_defaults(op);
                let first = pop_or(stack, first_default);
                let second = pop_or(stack, second_default);
                let text = if self.swapped.contains(&insn.opcode) {
                    format!("({first} {tok} {second})")
                } else {
                    format!("({second} {tok} {first})")
                };
                stack.push(text);
            }

            Op::UnaryPlus => unary(stack, "+"),
            Op::UnaryMinus => unary(stack, "-"),
            Op::UnaryNot => unary(stack, "!"),
            Op::UnaryBitNot => unary(stack, "~"),
            Op::TypeOf => {
                let v = pop_or(stack, "undefined");
                stack.push(format!("(typeof {v})"));
            }
            Op::Void => {
                let v = pop_or(stack, "0");
                stack.push(format!("(void {v})"));
            }
            Op::Throw => {
                let v = pop_or(stack, "undefined");
                line(out, indent, &format!("throw {v};"));
            }

            Op::IncVarPre | Op::IncVarPost | Op::DecVarPre | Op::DecVarPost => {
                let name = self.resolve_var(insn);
                let text = match op {
                    Op::IncVarPre => format!("(++{name})"),
                    Op::IncVarPost => format!("({name}++)"),
                    Op::DecVarPre => format!("(--{name})"),
                    _ => format!("({name}--)"),
                };
                stack.push(text);
            }
            Op::IncProperty | Op::DecProperty => {
                let obj = pop_or(stack, "undefined");
                let key = insn
                    .string_value
                    .clone()
                    .unwrap_or_else(|| self.string_at(insn.arg_u32(ArgKind::StringIndex).unwrap_or(0)));
                let target = Self::property_text(&obj, &format!("\"{}\"", escape_js_string(&key)));
                stack.push(update_text(op == Op::IncProperty, insn, target));
            }
            Op::IncComputed | Op::DecComputed => {
                let key = pop_or(stack, "0");
                let obj = pop_or(stack, "undefined");
                let target = format!("{obj}[{key}]");
                stack.push(update_text(op == Op::IncComputed, insn, target));
            }

            Op::LoadVar => {
                let name = self.resolve_var(insn);
                stack.push(name);
            }
            Op::StoreVar => {
                let v = pop_or(stack, "undefined");
                let name = self.resolve_var(insn);
                line(out, indent, &format!("var {name} = {v};"));
            }
            Op::AssignVar => {
                let v = pop_or(stack, "undefined");
                let scope = insn.arg_u32(ArgKind::Scope).unwrap_or(0);
                let slot = insn.arg_u32(ArgKind::Dest).unwrap_or(0);
                let name = self.names.resolve(scope, slot);
                let text = match insn.arg(ArgKind::AssignOp) {
                    Some(ArgValue::Op(compound)) => {
                        let tok = compound.binary_operator().unwrap_or("+");
                        format!("{name} {tok}= {v}")
                    }
                    _ => format!("{name} = {v}"),
                };
                stack.push(text);
            }

            Op::LoadGlobal => stack.push("globalThis".to_string()),
            Op::LoadGlobalProp => {
                let name = insn
                    .string_value
                    .clone()
                    .unwrap_or_else(|| self.string_at(insn.arg_u32(ArgKind::StringIndex).unwrap_or(0)));
                if is_safe_identifier(&name) {
                    stack.push(name);
                } else {
                    stack.push(format!("globalThis[\"{}\"]", escape_js_string(&name)));
                }
            }
            Op::LoadThis => stack.push("this".to_string()),
            Op::LoadArgument => {
                let i = insn.arg_u32(ArgKind::Dword).unwrap_or(0);
                stack.push(format!("arguments[{i}]"));
            }
            Op::LoadArguments => stack.push("arguments".to_string()),

            Op::CallFunction | Op::CallMethod | Op::Construct => {
                let argc = insn.arg_u32(ArgKind::Argc).unwrap_or(0) as usize;
                let callee = pop_or(stack, "undefined");
                if op == Op::CallMethod {
                    // Receiver sits under the callee; the callee text
                    // already names the property access.
                    let _receiver = pop_or(stack, "undefined");
                }
                let mut args: Vec<String> =
                    (0..argc).map(|_| pop_or(stack, "undefined")).collect();
                args.reverse();
                let text = if op == Op::Construct {
                    format!("new {callee}({})", args.join(", "))
                } else {
                    format!("{callee}({})", args.join(", "))
                };
                if self.next_consumes_result(idx) {
                    stack.push(text);
                } else {
                    line(out, indent, &format!("{text};"));
                }
            }

            Op::GetProp => {
                let key = pop_or(stack, "\"\"");
                let obj = pop_or(stack, "undefined");
                stack.push(Self::property_text(&obj, &key));
            }
            Op::SetProp => {
                let v = pop_or(stack, "undefined");
                let key = pop_or(stack, "\"\"");
                let obj = pop_or(stack, "undefined");
                let target = Self::property_text(&obj, &key);
                line(out, indent, &format!("{target} = {v};"));
            }

            Op::BuildArray => {
                let n = insn.arg_u32(ArgKind::Length).unwrap_or(0) as usize;
                let mut items: Vec<String> =
                    (0..n).map(|_| pop_or(stack, "undefined")).collect();
                items.reverse();
                stack.push(format!("[{}]", items.join(", ")));
            }
            Op::BuildObject => {
                let n = insn.arg_u32(ArgKind::Length).unwrap_or(0) as usize;
                let mut pairs: Vec<(String, String)> = (0..n)
                    .map(|_| {
                        let v = pop_or(stack, "undefined");
                        let k = pop_or(stack, "\"\"");
                        (k, v)
                    })
                    .collect();
                pairs.reverse();
                let body: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = k
                            .strip_prefix('"')
                            .and_then(|s| s.strip_suffix('"'))
                            .filter(|inner| is_safe_identifier(inner))
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("[{k}]"));
                        format!("{key}: {v}")
                    })
                    .collect();
                if body.is_empty() {
                    stack.push("{}".to_string());
                } else {
                    stack.push(format!("{{ {} }}", body.join(", ")));
                }
            }
            Op::BuildFunction => {
                let body = insn.fn_body.clone().unwrap_or_default();
                let text = self.lift_function(&body, indent);
                stack.push(text);
            }
            Op::BuildRegexp => {
                let text = match self.version {
                    Version::V1Legacy => {
                        let pattern = insn
                            .string_value
                            .clone()
                            .unwrap_or_else(|| self.string_at(insn.arg_u32(ArgKind::StringIndex).unwrap_or(0)));
                        let flags_idx = insn
                            .args
                            .iter()
                            .filter(|a| a.kind == ArgKind::StringIndex)
                            .nth(1)
                            .map(|a| a.value.as_u32())
                            .unwrap_or(0);
                        let flags = self.string_at(flags_idx);
                        format!(
                            "new RegExp(\"{}\", \"{}\")",
                            escape_js_string(&pattern),
                            escape_js_string(&flags)
                        )
                    }
                    Version::V2Current => {
                        let has_flags = insn.arg_u32(ArgKind::HasFlags).unwrap_or(0) == 1;
                        let flags = if has_flags {
                            pop_or(stack, "\"\"")
                        } else {
                            "\"\"".to_string()
                        };
                        let pattern = pop_or(stack, "\"\"");
                        format!("new RegExp({pattern}, {flags})")
                    }
                };
                stack.push(text);
            }

            // Control transfers not absorbed by any region: unstructured
            // fallback as labeled comments.
            Op::Jump => {
                let target = insn.jump_target().unwrap_or(0);
                line(out, indent, &format!("// goto L_{target:04x}"));
            }
            Op::JumpIfTrue | Op::JumpIfFalse => {
                let cond = pop_or(stack, "false");
                let target = insn.jump_target().unwrap_or(0);
                let cond = if op == Op::JumpIfFalse {
                    format!("!{cond}")
                } else {
                    cond
                };
                line(out, indent, &format!("// if ({cond}) goto L_{target:04x}"));
            }

            Op::Return => {
                let has_value = insn.arg_u32(ArgKind::HasValue).unwrap_or(0) == 1;
                *pending_return = Some(if has_value {
                    format!("return {};", pop_or(stack, "undefined"))
                } else {
                    "return;".to_string()
                });
            }
            Op::Debugger => line(out, indent, "debugger;"),

            // Exception bookkeeping outside a recognized region. TRY_CATCH
            // names the caught value at a catch entry.
            Op::TryCatch => stack.push("e".to_string()),
            Op::TryPush | Op::TryPop | Op::TryFinally => {}

            _ => {
                line(out, indent, &format!("/* {} unhandled */", insn.name()));
            }
        }
    }

    fn resolve_var(&mut self, insn: &Instruction) -> String {
        let scope = insn.arg_u32(ArgKind::Scope).unwrap_or(0);
        let slot = insn.arg_u32(ArgKind::VarSlot).unwrap_or(0);
        self.names.resolve(scope, slot)
    }

    /// Re-disassemble and lift a nested function body, propagating the
    /// version, map, and string table. The nested body gets a fresh
    /// variable bijection but inherits the name counter.
    fn lift_function(&mut self, body: &[u8], indent: usize) -> String {
        let insns = disasm::disassemble(body, self.map, self.strings, self.version);
        let cfg = Cfg::build(&insns);
        let dominators = dom::analyze(&cfg);
        let regions = regions::recognize(&insns, &cfg, &dominators);

        let mut nested = Lifter {
            insns: &insns,
            cfg: &cfg,
            regions: &regions,
            strings: self.strings,
            map: self.map,
            swapped: self.swapped,
            version: self.version,
            names: VarNamer::new(self.names.counter, self.names.unknown_counter),
        };

        let mut lines = Vec::new();
        let mut stack = Vec::new();
        nested.lift_range(0, insns.len(), &mut stack, &mut lines, 0, None);

        self.names.counter = nested.names.counter;
        self.names.unknown_counter = nested.names.unknown_counter;

        let body_text = emit::finish(lines);
        if body_text.is_empty() {
            return "function () {}".to_string();
        }
        let inner_pad = "  ".repeat(indent + 1);
        let close_pad = "  ".repeat(indent);
        let mut text = String::from("function () {\n");
        for l in body_text.lines() {
            text.push_str(&inner_pad);
            text.push_str(l);
            text.push('\n');
        }
        text.push_str(&close_pad);
        text.push('}');
        text
    }
}

fn unary(stack: &mut Vec<String>, tok: &str) {
    let v = pop_or(stack, "0");
    stack.push(format!("({tok}{v})"));
}

fn update_text(inc: bool, insn: &Instruction, target: String) -> String {
    let prefix = insn.arg_u32(ArgKind::Prefix).unwrap_or(1) == 1;
    let tok = if inc { "++" } else { "--" };
    if prefix {
        format!("({tok}{target})")
    } else {
        format!("({target}{tok})")
    }
}

/// Underflow defaults: `(first, second)` in pop order.
fn binary_defaults(op: Op) -> (&'static str, &'static str) {
    match op {
        Op::In => ("{}", "\"\""),
        Op::InstanceOf => ("Object", "null"),
        _ => ("0", "0"),
    }
}

/// Double literal that parses back to the same IEEE 754 value.
fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // Rust's shortest-roundtrip formatting.
        format!("{v}")
    }
}
