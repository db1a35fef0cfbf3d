//! Ordered decision cascade from feature vector to canonical opcode.
//!
//! Rules are tried top to bottom; the first match wins. Lexically specific
//! shapes (debugger, the literal pushes, updates, builders, calls) come
//! before the generic arithmetic / comparison / bitwise / unary rules that
//! disambiguate purely by operator presence. A vector matching no rule
//! yields `None` and the opcode stays unmapped.

use jsvmd_isa::Op;

use crate::features::Features;

pub fn classify(f: &Features) -> Option<Op> {
    // Lexically unmistakable markers first.
    if f.has_debugger {
        return Some(Op::Debugger);
    }

    // Literal pushes.
    if f.reads_string_table && f.push_calls == 1 && f.pop_calls == 0 && !f.has_update && !f.uses_new
        && !f.uses_global
    {
        return Some(Op::PushString);
    }
    if f.reads_byte && f.eq_against_one && f.push_calls == 1 && f.pop_calls == 0 {
        return Some(Op::PushBool);
    }
    if f.reads_dword
        && f.push_calls == 1
        && f.pop_calls == 0
        && !f.reads_string_table
        && !f.uses_arguments
        && !f.uses_scopes
        && !f.uses_global
    {
        return Some(Op::PushInt);
    }
    if f.has_double_read && f.push_calls == 1 {
        return Some(Op::PushDouble);
    }
    if f.push_calls == 1 && f.pop_calls == 0 && f.operators.contains("void") {
        return Some(Op::PushUndefined);
    }

    // Updates, split by target kind.
    if f.has_update {
        let inc = f.operators.contains("++");
        if f.uses_scopes && f.double_scope_access {
            return Some(match (inc, f.update_prefix) {
                (true, true) => Op::IncVarPre,
                (true, false) => Op::IncVarPost,
                (false, true) => Op::DecVarPre,
                (false, false) => Op::DecVarPost,
            });
        }
        if f.reads_string_table {
            return Some(if inc { Op::IncProperty } else { Op::DecProperty });
        }
        return Some(if inc { Op::IncComputed } else { Op::DecComputed });
    }

    // Builders and calls.
    if f.has_nested_function {
        return Some(Op::BuildFunction);
    }
    if f.uses_new && !f.has_loop {
        return Some(Op::BuildRegexp);
    }
    if f.uses_new && f.has_loop {
        return Some(Op::Construct);
    }
    if f.uses_apply && f.has_loop {
        return Some(if f.uses_global {
            Op::CallFunction
        } else {
            Op::CallMethod
        });
    }
    if f.has_array_lit && f.has_loop && f.reads_dword && f.push_calls == 1 {
        return Some(Op::BuildArray);
    }
    if f.has_object_lit && f.has_loop {
        return Some(Op::BuildObject);
    }

    // Exception bookkeeping.
    if f.uses_catch_stack && f.reads_dword {
        return Some(Op::TryPush);
    }
    if f.uses_catch_stack {
        return Some(Op::TryPop);
    }
    if f.uses_error_slot && f.has_assign {
        return Some(Op::TryFinally);
    }
    if f.uses_error_slot && f.push_calls == 1 {
        return Some(Op::TryCatch);
    }

    // Context loads.
    if f.uses_global && f.reads_string_table {
        return Some(Op::LoadGlobalProp);
    }
    if f.uses_global && f.push_calls == 1 && f.pop_calls == 0 {
        return Some(Op::LoadGlobal);
    }
    if f.uses_this_ref && f.push_calls == 1 {
        return Some(Op::LoadThis);
    }
    if f.uses_arguments && f.reads_dword {
        return Some(Op::LoadArgument);
    }
    if f.uses_arguments {
        return Some(Op::LoadArguments);
    }

    // Scope-slot variables.
    if f.uses_scopes {
        if f.has_assign && f.reads_byte {
            return Some(Op::AssignVar);
        }
        if f.has_assign && f.pop_calls >= 1 && f.push_calls == 0 {
            return Some(Op::StoreVar);
        }
        if !f.has_assign && f.push_calls == 1 {
            return Some(Op::LoadVar);
        }
    }

    // Control transfers: an address read plus an instruction-pointer store.
    if f.reads_dword && f.has_assign && f.pop_calls == 0 && f.push_calls == 0 {
        return Some(Op::Jump);
    }
    if f.reads_dword && f.has_assign && f.pop_calls == 1 {
        return Some(if f.operators.contains("!") {
            Op::JumpIfFalse
        } else {
            Op::JumpIfTrue
        });
    }

    if f.has_throw && f.pop_calls >= 1 {
        return Some(Op::Throw);
    }

    // Property traffic.
    if f.has_assign && f.pop_calls == 3 && f.computed_members > 0 {
        return Some(Op::SetProp);
    }
    if f.pop_calls == 2 && f.push_calls == 1 && f.computed_members > 0 && f.operators.is_empty() {
        return Some(Op::GetProp);
    }
    if f.pop_calls == 2 && f.push_calls == 1 && f.computed_members == 0 && f.operators.is_empty() {
        return Some(Op::SeqPop);
    }

    // Bare stack plumbing.
    if f.pop_calls == 1 && f.push_calls == 0 && f.stmt_count == 1 {
        return Some(Op::Pop);
    }
    if f.push_calls == 1 && f.pop_calls == 0 && f.computed_members > 0 && !f.reads_dword {
        return Some(Op::Dup);
    }
    if f.push_calls == 1
        && f.pop_calls == 0
        && f.operators.is_empty()
        && !f.reads_dword
        && !f.reads_byte
        && f.computed_members == 0
    {
        return Some(Op::PushNull);
    }

    // Generic binary disambiguation by operator presence.
    if f.push_calls == 1 && f.pop_calls == 2 {
        for (token, op) in BINARY_TOKENS {
            if f.operators.contains(*token) {
                return Some(*op);
            }
        }
    }

    // Generic unary disambiguation.
    if f.push_calls == 1 && f.pop_calls == 1 {
        for (token, op) in UNARY_TOKENS {
            if f.operators.contains(*token) {
                return Some(*op);
            }
        }
    }

    None
}

// Longest-or-most-specific token first so `===` wins over `==`, `>>>` over
// `>>`, and so on.
const BINARY_TOKENS: &[(&str, Op)] = &[
    ("===", Op::StrictEqual),
    ("!==", Op::StrictNotEqual),
    ("==", Op::Equal),
    ("!=", Op::NotEqual),
    ("<=", Op::LessEqual),
    (">=", Op::GreaterEqual),
    ("<<", Op::Shl),
    (">>>", Op::Ushr),
    (">>", Op::Shr),
    ("<", Op::Less),
    (">", Op::Greater),
    ("+", Op::Add),
    ("-", Op::Sub),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("%", Op::Mod),
    ("&", Op::BitAnd),
    ("|", Op::BitOr),
    ("^", Op::BitXor),
    ("in", Op::In),
    ("instanceof", Op::InstanceOf),
];

const UNARY_TOKENS: &[(&str, Op)] = &[
    ("typeof", Op::TypeOf),
    ("void", Op::Void),
    ("!", Op::UnaryNot),
    ("~", Op::UnaryBitNot),
    ("-", Op::UnaryMinus),
    ("+", Op::UnaryPlus),
];
