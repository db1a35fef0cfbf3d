//! Opcode fingerprinting: recovering the shuffled opcode numbering of an
//! obfuscated payload by structural analysis of its interpreter.
//!
//! The obfuscator assigns every payload a fresh random numbering, so raw
//! opcode bytes mean nothing on their own. What it cannot randomize is the
//! *shape* of each handler in the dispatch table: a string push always reads
//! a string-table entry, a binary subtract always pops twice around a `-`,
//! and so on. Each handler is reduced to a [`features::Features`] vector and
//! run through an ordered classification cascade; the dispatcher's
//! terminating comparison nominates the RETURN opcode.

pub mod ast;
pub mod classify;
pub mod features;

use std::collections::BTreeMap;

use jsvmd_isa::{OpcodeMap, SwappedOpcodes};

use crate::ast::Node;

/// Parsed representation of the embedded interpreter, as produced by the
/// extraction boundary: the dispatch table keyed by raw opcode number, and
/// the dispatcher's main-loop body.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    pub handlers: BTreeMap<u8, Vec<Node>>,
    pub dispatch_body: Vec<Node>,
}

/// Fingerprinting result: the recovered opcode map (including the RETURN
/// nomination) and the set of binary handlers with reversed operand order.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub map: OpcodeMap,
    pub swapped: SwappedOpcodes,
}

/// Fingerprint an interpreter. Deterministic: the same parsed tree always
/// produces the same map. Unclassifiable handlers yield no entry and their
/// opcodes surface as `UNKNOWN_<n>` downstream.
pub fn fingerprint(interp: &Interpreter) -> Fingerprint {
    let mut map = OpcodeMap::new();
    let mut swapped = SwappedOpcodes::default();

    for (&raw, handler) in &interp.handlers {
        let feats = features::extract(handler);
        match classify::classify(&feats) {
            Some(op) => {
                if op.is_binary() && feats.pop_into_binding {
                    swapped.insert(raw);
                }
                map.insert(raw, op);
            }
            None => log::debug!("handler {raw} matched no classification rule"),
        }
    }

    if let Some(ret) = find_return_opcode(&interp.dispatch_body) {
        map.set_return_opcode(ret);
    } else {
        log::warn!("no RETURN comparison found in dispatcher loop");
    }

    Fingerprint { map, swapped }
}

/// Scan the dispatcher's main loop for a top-level `<x> === <n>` guard whose
/// branch returns: `n` is the RETURN opcode of this payload.
pub fn find_return_opcode(dispatch_body: &[Node]) -> Option<u8> {
    let mut found = None;
    ast::walk_all(dispatch_body, &mut |node| {
        if found.is_some() {
            return;
        }
        let (Node::While { body, .. } | Node::For { body }) = node else {
            return;
        };
        for stmt in body {
            let Node::If {
                cond, then_body, ..
            } = stmt
            else {
                continue;
            };
            let Node::Binary { op, left, right } = cond.as_ref() else {
                continue;
            };
            if op != "===" && op != "==" {
                continue;
            }
            let lit = match (left.as_ref(), right.as_ref()) {
                (Node::Num(n), _) | (_, Node::Num(n)) => *n,
                _ => continue,
            };
            let returns = then_body
                .iter()
                .any(|s| matches!(s, Node::Return(_)));
            if returns && lit >= 0.0 && lit <= u8::MAX as f64 && lit.fract() == 0.0 {
                found = Some(lit as u8);
                return;
            }
        }
    });
    found
}
