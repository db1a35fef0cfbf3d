//! Line emission and the post-pass cleanup.

use std::collections::HashSet;

/// Push one statement line at the given indent depth (two spaces per level).
pub fn line(out: &mut Vec<String>, indent: usize, text: &str) {
    let mut s = String::with_capacity(indent * 2 + text.len());
    for _ in 0..indent {
        s.push_str("  ");
    }
    s.push_str(text);
    out.push(s);
}

/// Post-pass: drop lone trivial-literal lines and de-duplicate successive
/// declarations of the same variable within a scope, then join.
pub fn finish(lines: Vec<String>) -> String {
    let mut frames: Vec<HashSet<String>> = vec![HashSet::new()];
    let mut out = String::new();

    for mut line in lines {
        let trimmed = line.trim_start();

        if is_trivial_literal_stmt(trimmed) {
            continue;
        }

        if trimmed.starts_with('}') && frames.len() > 1 {
            frames.pop();
        }

        if let Some(name) = declared_name(trimmed) {
            let frame = frames.last_mut().expect("at least one frame");
            if !frame.insert(name) {
                // Re-declaration in the same scope becomes an assignment.
                line = line.replacen("var ", "", 1);
            }
        }

        if line.trim_end().ends_with('{') {
            frames.push(HashSet::new());
        }

        out.push_str(&line);
        out.push('\n');
    }

    out
}

/// `undefined;`, `null;`, or a bare numeric literal statement.
fn is_trivial_literal_stmt(s: &str) -> bool {
    let Some(body) = s.strip_suffix(';') else {
        return false;
    };
    let body = body.trim();
    body == "undefined" || body == "null" || body.parse::<f64>().is_ok()
}

fn declared_name(s: &str) -> Option<String> {
    let rest = s.strip_prefix("var ")?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Matches `^[A-Za-z_$][A-Za-z0-9_$]*$`: keys that may use dotted access.
pub fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' && first != '$' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{{{:04x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
