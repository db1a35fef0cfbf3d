//! Abstract tree model of the embedded interpreter.
//!
//! The fingerprinter never executes handler code; it only needs typed node
//! discrimination and child access. The external script parser is wrapped
//! into this model by the caller, and tests construct trees directly through
//! [`build`].
//!
//! Conventions the model relies on (the extraction boundary normalizes the
//! obfuscated names to these):
//! - helper calls are bare identifiers: `push(x)`, `pop()`, `readByte()`,
//!   `readDword()`, `readDouble()`;
//! - the interpreter state is the identifier `state` with the nominal
//!   fields `stack`, `scopes`, `strings`, `arguments`, `thisRef`, `global`,
//!   plus the auxiliary `catches` (try stack) and `error` (caught value).

/// A statement or expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Statements
    ExprStmt(Box<Node>),
    VarDecl {
        name: String,
        init: Option<Box<Node>>,
    },
    If {
        cond: Box<Node>,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    While {
        cond: Box<Node>,
        body: Vec<Node>,
    },
    For {
        body: Vec<Node>,
    },
    TryFinally {
        body: Vec<Node>,
        finalizer: Vec<Node>,
    },
    Return(Option<Box<Node>>),
    Throw(Box<Node>),
    Debugger,

    // Expressions
    Ident(String),
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Member {
        object: Box<Node>,
        property: Box<Node>,
        computed: bool,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    New {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Binary {
        op: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: String,
        arg: Box<Node>,
    },
    Update {
        op: String,
        prefix: bool,
        target: Box<Node>,
    },
    Assign {
        op: String,
        target: Box<Node>,
        value: Box<Node>,
    },
    Cond {
        test: Box<Node>,
        cons: Box<Node>,
        alt: Box<Node>,
    },
    Array(Vec<Node>),
    Object(Vec<(String, Node)>),
    Spread(Box<Node>),
    Function {
        params: Vec<String>,
        body: Vec<Node>,
    },
}

/// Pre-order walk over a node and all of its children.
pub fn walk<'a>(node: &'a Node, f: &mut dyn FnMut(&'a Node)) {
    f(node);
    match node {
        Node::ExprStmt(e) | Node::Throw(e) | Node::Spread(e) => walk(e, f),
        Node::VarDecl { init, .. } => {
            if let Some(init) = init {
                walk(init, f);
            }
        }
        Node::If {
            cond,
            then_body,
            else_body,
        } => {
            walk(cond, f);
            walk_all(then_body, f);
            walk_all(else_body, f);
        }
        Node::While { cond, body } => {
            walk(cond, f);
            walk_all(body, f);
        }
        Node::For { body } => walk_all(body, f),
        Node::TryFinally { body, finalizer } => {
            walk_all(body, f);
            walk_all(finalizer, f);
        }
        Node::Return(Some(e)) => walk(e, f),
        Node::Member {
            object, property, ..
        } => {
            walk(object, f);
            walk(property, f);
        }
        Node::Call { callee, args } | Node::New { callee, args } => {
            walk(callee, f);
            walk_all(args, f);
        }
        Node::Binary { left, right, .. } => {
            walk(left, f);
            walk(right, f);
        }
        Node::Unary { arg, .. } => walk(arg, f),
        Node::Update { target, .. } => walk(target, f),
        Node::Assign { target, value, .. } => {
            walk(target, f);
            walk(value, f);
        }
        Node::Cond { test, cons, alt } => {
            walk(test, f);
            walk(cons, f);
            walk(alt, f);
        }
        Node::Array(items) => walk_all(items, f),
        Node::Object(props) => {
            for (_, v) in props {
                walk(v, f);
            }
        }
        Node::Function { body, .. } => walk_all(body, f),
        Node::Return(None)
        | Node::Debugger
        | Node::Ident(_)
        | Node::Num(_)
        | Node::Str(_)
        | Node::Bool(_)
        | Node::Null => {}
    }
}

pub fn walk_all<'a>(nodes: &'a [Node], f: &mut dyn FnMut(&'a Node)) {
    for n in nodes {
        walk(n, f);
    }
}

/// Terse constructors for handler trees. Used by the extraction boundary
/// and throughout the fingerprinter's tests.
pub mod build {
    use super::Node;

    pub fn ident(name: &str) -> Node {
        Node::Ident(name.to_string())
    }

    pub fn num(v: f64) -> Node {
        Node::Num(v)
    }

    pub fn call(callee: &str, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Box::new(ident(callee)),
            args,
        }
    }

    /// `push(<arg>);` as a statement.
    pub fn push_stmt(arg: Node) -> Node {
        Node::ExprStmt(Box::new(call("push", vec![arg])))
    }

    /// `pop()` as an expression.
    pub fn pop() -> Node {
        call("pop", vec![])
    }

    pub fn read_byte() -> Node {
        call("readByte", vec![])
    }

    pub fn read_dword() -> Node {
        call("readDword", vec![])
    }

    pub fn read_double() -> Node {
        call("readDouble", vec![])
    }

    /// `state.<field>`
    pub fn state(field: &str) -> Node {
        Node::Member {
            object: Box::new(ident("state")),
            property: Box::new(ident(field)),
            computed: false,
        }
    }

    /// `<object>[<index>]`
    pub fn index(object: Node, idx: Node) -> Node {
        Node::Member {
            object: Box::new(object),
            property: Box::new(idx),
            computed: true,
        }
    }

    /// `state.strings[readDword()]`
    pub fn string_entry() -> Node {
        index(state("strings"), read_dword())
    }

    /// `state.scopes[readDword()][readDword()]`
    pub fn scope_slot() -> Node {
        index(index(state("scopes"), read_dword()), read_dword())
    }

    pub fn member(object: Node, name: &str) -> Node {
        Node::Member {
            object: Box::new(object),
            property: Box::new(ident(name)),
            computed: false,
        }
    }

    pub fn binary(op: &str, left: Node, right: Node) -> Node {
        Node::Binary {
            op: op.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: &str, arg: Node) -> Node {
        Node::Unary {
            op: op.to_string(),
            arg: Box::new(arg),
        }
    }

    pub fn assign(target: Node, value: Node) -> Node {
        Node::Assign {
            op: "=".to_string(),
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn expr(e: Node) -> Node {
        Node::ExprStmt(Box::new(e))
    }

    pub fn decl(name: &str, init: Node) -> Node {
        Node::VarDecl {
            name: name.to_string(),
            init: Some(Box::new(init)),
        }
    }

    pub fn method_call(object: Node, name: &str, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Box::new(member(object, name)),
            args,
        }
    }
}
