//! Structural feature extraction over a handler's statement list.

use std::collections::BTreeSet;

use crate::ast::{Node, walk_all};

/// The feature vector recorded for one handler. Purely structural; nothing
/// here depends on opcode numbers or handler order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Features {
    // Counts
    pub push_calls: u32,
    pub pop_calls: u32,
    pub stmt_count: u32,
    pub computed_members: u32,
    pub nested_computed: u32,

    // Reads
    pub reads_string_table: bool,
    pub reads_dword: bool,
    pub reads_byte: bool,
    pub has_double_read: bool,

    // Shape
    pub has_loop: bool,
    pub uses_apply: bool,
    pub uses_new: bool,
    pub has_assign: bool,
    pub has_nullish_assign: bool,
    pub has_update: bool,
    pub update_prefix: bool,
    pub has_array_lit: bool,
    pub has_object_lit: bool,
    pub has_spread: bool,
    pub has_nested_function: bool,
    pub has_try_finally: bool,
    pub has_throw: bool,
    pub has_debugger: bool,

    // State-object accesses
    pub uses_this_ref: bool,
    pub uses_arguments: bool,
    pub uses_scopes: bool,
    pub uses_global: bool,
    pub uses_catch_stack: bool,
    pub uses_error_slot: bool,
    pub double_scope_access: bool,

    // Operator set across all expressions
    pub operators: BTreeSet<String>,

    // Specials
    pub eq_against_one: bool,
    /// A `pop()` captured into a binding before use: the swapped-operand
    /// evaluation order for binary handlers.
    pub pop_into_binding: bool,
}

/// Extract the feature vector for a handler body.
pub fn extract(handler: &[Node]) -> Features {
    let mut f = Features {
        stmt_count: handler.len() as u32,
        ..Features::default()
    };

    walk_all(handler, &mut |node| match node {
        Node::Call { callee, .. } => {
            if let Node::Ident(name) = callee.as_ref() {
                match name.as_str() {
                    "push" => f.push_calls += 1,
                    "pop" => f.pop_calls += 1,
                    "readByte" => f.reads_byte = true,
                    "readDword" => f.reads_dword = true,
                    "readDouble" => f.has_double_read = true,
                    _ => {}
                }
            }
            if let Node::Member {
                property,
                computed: false,
                ..
            } = callee.as_ref()
            {
                if let Node::Ident(p) = property.as_ref() {
                    if p == "apply" {
                        f.uses_apply = true;
                    }
                }
            }
        }
        Node::New { .. } => f.uses_new = true,
        Node::Member {
            object,
            property,
            computed,
        } => {
            if *computed {
                f.computed_members += 1;
                if matches!(object.as_ref(), Node::Member { computed: true, .. }) {
                    f.nested_computed += 1;
                }
                // state.strings[readDword()]
                if is_state_field(object, "strings") && is_helper_call(property, "readDword") {
                    f.reads_string_table = true;
                }
                // state.scopes[..][..]
                if let Node::Member {
                    object: inner,
                    computed: true,
                    ..
                } = object.as_ref()
                {
                    if is_state_field(inner, "scopes") {
                        f.double_scope_access = true;
                    }
                }
            }
            if is_state_field(node, "thisRef") {
                f.uses_this_ref = true;
            }
            if is_state_field(node, "arguments") {
                f.uses_arguments = true;
            }
            if is_state_field(node, "scopes") {
                f.uses_scopes = true;
            }
            if is_state_field(node, "global") {
                f.uses_global = true;
            }
            if is_state_field(node, "catches") {
                f.uses_catch_stack = true;
            }
            if is_state_field(node, "error") {
                f.uses_error_slot = true;
            }
        }
        Node::While { .. } | Node::For { .. } => f.has_loop = true,
        Node::Assign { op, .. } => {
            f.has_assign = true;
            if op == "??=" {
                f.has_nullish_assign = true;
            }
            if op.len() > 1 {
                f.operators.insert(op.trim_end_matches('=').to_string());
            }
        }
        Node::Update { op, prefix, .. } => {
            f.has_update = true;
            f.update_prefix = *prefix;
            f.operators.insert(op.clone());
        }
        Node::Binary { op, left, right } => {
            f.operators.insert(op.clone());
            if (op == "===" || op == "==")
                && (matches!(left.as_ref(), Node::Num(n) if *n == 1.0)
                    || matches!(right.as_ref(), Node::Num(n) if *n == 1.0))
            {
                f.eq_against_one = true;
            }
        }
        Node::Unary { op, .. } => {
            f.operators.insert(op.clone());
        }
        Node::Array(_) => f.has_array_lit = true,
        Node::Object(_) => f.has_object_lit = true,
        Node::Spread(_) => f.has_spread = true,
        Node::Function { .. } => f.has_nested_function = true,
        Node::TryFinally { .. } => f.has_try_finally = true,
        Node::Throw(_) => f.has_throw = true,
        Node::Debugger => f.has_debugger = true,
        Node::VarDecl {
            init: Some(init), ..
        } => {
            let mut saw_pop = false;
            crate::ast::walk(init, &mut |n| {
                if is_helper_call(n, "pop") {
                    saw_pop = true;
                }
            });
            if saw_pop {
                f.pop_into_binding = true;
            }
        }
        _ => {}
    });

    f
}

/// Is this node `state.<field>` (non-computed)?
fn is_state_field(node: &Node, field: &str) -> bool {
    if let Node::Member {
        object,
        property,
        computed: false,
    } = node
    {
        if let (Node::Ident(obj), Node::Ident(prop)) = (object.as_ref(), property.as_ref()) {
            return obj == "state" && prop == field;
        }
    }
    false
}

fn is_helper_call(node: &Node, helper: &str) -> bool {
    if let Node::Call { callee, .. } = node {
        if let Node::Ident(name) = callee.as_ref() {
            return name == helper;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn counts_push_and_pop_helpers_only() {
        // push(pop() + pop()) plus an unrelated member .push call
        let handler = vec![
            push_stmt(binary("+", pop(), pop())),
            expr(method_call(state("catches"), "push", vec![num(0.0)])),
        ];
        let f = extract(&handler);
        assert_eq!(f.push_calls, 1);
        assert_eq!(f.pop_calls, 2);
        assert!(f.uses_catch_stack);
    }

    #[test]
    fn detects_string_table_read() {
        let f = extract(&[push_stmt(string_entry())]);
        assert!(f.reads_string_table);
        assert!(f.reads_dword);
        assert_eq!(f.computed_members, 1);
    }

    #[test]
    fn detects_double_scope_access() {
        let f = extract(&[push_stmt(scope_slot())]);
        assert!(f.uses_scopes);
        assert!(f.double_scope_access);
        assert_eq!(f.nested_computed, 1);
    }

    #[test]
    fn detects_pop_into_binding() {
        let handler = vec![
            decl("n", pop()),
            push_stmt(binary("-", pop(), ident("n"))),
        ];
        let f = extract(&handler);
        assert!(f.pop_into_binding);
        assert!(f.operators.contains("-"));
    }

    #[test]
    fn detects_equality_against_one() {
        let f = extract(&[push_stmt(binary("===", read_byte(), num(1.0)))]);
        assert!(f.eq_against_one);
        assert!(f.reads_byte);
    }
}
