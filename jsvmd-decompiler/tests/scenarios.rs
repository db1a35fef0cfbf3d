//! End-to-end scenarios: canonical instruction streams in, source text out.

mod common;

use common::{no_swapped, swapped, test_map, Asm};
use jsvmd_decompiler::decompile_bytes;
use jsvmd_isa::{Op, Version};

fn decompile(bytes: &[u8]) -> String {
    decompile_bytes(bytes, Version::V2Current, &[], &test_map(), &no_swapped())
}

#[test]
fn arithmetic_roundtrip() {
    let mut a = Asm::new();
    a.push_int(2).push_int(3).binary(Op::Add).ret(true);
    assert_eq!(decompile(&a.into_bytes()).trim(), "return (2 + 3);");
}

#[test]
fn swapped_subtraction_reverses_operand_order() {
    let mut a = Asm::new();
    a.push_int(10).push_int(3).binary(Op::Sub).ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &[],
        &test_map(),
        &swapped(&[Op::Sub]),
    );
    // Swapped handlers evaluate second-pop OP first-pop.
    assert_eq!(out.trim(), "return (3 - 10);");
}

#[test]
fn canonical_subtraction_is_not_reversed() {
    let mut a = Asm::new();
    a.push_int(10).push_int(3).binary(Op::Sub).ret(true);
    assert_eq!(decompile(&a.into_bytes()).trim(), "return (10 - 3);");
}

#[test]
fn if_else_with_stores() {
    let mut a = Asm::new();
    a.push_bool(true);
    let to_else = a.jump_fwd(Op::JumpIfFalse);
    a.push_int(1).store_var(0, 0);
    let to_merge = a.jump_fwd(Op::Jump);
    a.patch_here(to_else);
    a.push_int(2).store_var(0, 0);
    a.patch_here(to_merge);
    a.ret(false);

    let expected = "\
if (true) {
  var var_0 = 1;
} else {
  var var_0 = 2;
}
return;
";
    assert_eq!(decompile(&a.into_bytes()), expected);
}

#[test]
fn ternary_reduces_to_single_expression() {
    let mut a = Asm::new();
    a.push_bool(true);
    let to_else = a.jump_fwd(Op::JumpIfFalse);
    a.push_int(1);
    let to_merge = a.jump_fwd(Op::Jump);
    a.patch_here(to_else);
    a.push_int(2);
    a.patch_here(to_merge);
    a.ret(true);

    assert_eq!(decompile(&a.into_bytes()).trim(), "return (true ? 1 : 2);");
}

#[test]
fn v2_pre_test_loop() {
    let mut a = Asm::new();
    let top = a.here();
    a.load_var(0, 0).push_int(10).binary(Op::Less);
    let to_exit = a.jump_fwd(Op::JumpIfFalse);
    a.load_var(0, 0)
        .push_int(1)
        .binary(Op::Add)
        .assign_var(0, 0)
        .pop()
        .jump(top);
    a.patch_here(to_exit);
    a.ret(false);

    let expected = "\
while ((var_0 < 10)) {
  var_0 = (var_0 + 1);
}
return;
";
    assert_eq!(decompile(&a.into_bytes()), expected);
}

#[test]
fn v1_post_test_loop_shape() {
    // jump cond; body; cond: load; jif_true body
    let mut a = Asm::new();
    let to_cond = a.jump_fwd(Op::Jump);
    let body = a.here();
    a.load_var(0, 0).push_int(1).binary(Op::Add).assign_var(0, 0).pop();
    a.patch_here(to_cond);
    a.load_var(0, 0).push_int(3).binary(Op::Less);
    a.jif_true(body);
    a.ret(false);

    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V1Legacy,
        &[],
        &test_map(),
        &no_swapped(),
    );
    let expected = "\
while ((var_0 < 3)) {
  var_0 = (var_0 + 1);
}
return;
";
    assert_eq!(out, expected);
}

#[test]
fn short_circuit_and() {
    let mut a = Asm::new();
    a.load_var(0, 0).dup();
    let to_end = a.jump_fwd(Op::JumpIfFalse);
    a.pop().load_var(0, 1);
    a.patch_here(to_end);
    a.ret(true);

    assert_eq!(decompile(&a.into_bytes()).trim(), "return (var_0 && var_1);");
}

#[test]
fn short_circuit_or() {
    let mut a = Asm::new();
    a.load_var(0, 0).dup();
    let to_end = a.jump_fwd(Op::JumpIfTrue);
    a.pop().load_var(0, 1);
    a.patch_here(to_end);
    a.ret(true);

    assert_eq!(decompile(&a.into_bytes()).trim(), "return (var_0 || var_1);");
}

// --- boundary behavior ---

#[test]
fn empty_bytecode_gives_empty_output() {
    assert_eq!(decompile(&[]), "");
}

#[test]
fn single_return() {
    let mut a = Asm::new();
    a.ret(false);
    assert_eq!(decompile(&a.into_bytes()).trim(), "return;");
}

#[test]
fn unused_call_result_becomes_a_statement() {
    // The trailing RETURN carries no value, so the call result is unused.
    let strings = vec!["doWork".to_string()];
    let mut a = Asm::new();
    a.load_global_prop(0).call_function(0).ret(false);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out, "doWork();\nreturn;\n");
}

#[test]
fn consumed_call_result_stays_an_expression() {
    let strings = vec!["getValue".to_string()];
    let mut a = Asm::new();
    a.load_global_prop(0).call_function(0).ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return getValue();");
}

// --- expression details ---

#[test]
fn call_arguments_appear_in_source_order() {
    // The compiler pushes arguments in source order and the interpreter
    // rebuilds them by prepending pops, so the lifter reverses its pops.
    let strings = vec!["f".to_string()];
    let mut a = Asm::new();
    a.push_int(1)
        .push_int(2)
        .load_global_prop(0)
        .call_function(2)
        .ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return f(1, 2);");
}

#[test]
fn double_literal_roundtrips_exactly() {
    for v in [0.1f64, 3.141592653589793, -1234.5e6, 2.2250738585072014e-308] {
        let mut a = Asm::new();
        a.push_double(v).ret(true);
        let out = decompile(&a.into_bytes());
        let literal = out
            .trim()
            .strip_prefix("return ")
            .and_then(|s| s.strip_suffix(';'))
            .unwrap();
        assert_eq!(literal.parse::<f64>().unwrap(), v);
    }
}

#[test]
fn string_push_quotes_and_escapes() {
    let strings = vec!["he said \"hi\"\n".to_string()];
    let mut a = Asm::new();
    a.push_string(0).ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return \"he said \\\"hi\\\"\\n\";");
}

#[test]
fn property_access_prefers_dotted_form() {
    let strings = vec!["console".to_string(), "log".to_string(), "not-an-ident".to_string()];
    let mut a = Asm::new();
    a.load_global_prop(0).push_string(1).get_prop().ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return console.log;");

    let mut a = Asm::new();
    a.load_global_prop(0).push_string(2).get_prop().ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return console[\"not-an-ident\"];");
}

#[test]
fn compound_assignment_uses_embedded_opcode() {
    let mut a = Asm::new();
    a.load_var(0, 0).pop(); // mint var_0 first
    a.push_int(5).assign_var_compound(0, 0, Op::Add).pop();
    a.ret(false);
    let out = decompile(&a.into_bytes());
    assert!(out.contains("var_0 += 5;"), "got: {out}");
}

#[test]
fn build_array_and_object_literals() {
    let strings = vec!["k".to_string()];
    let mut a = Asm::new();
    a.push_int(1).push_int(2).build_array(2).ret(true);
    assert_eq!(decompile(&a.into_bytes()).trim(), "return [1, 2];");

    let mut a = Asm::new();
    a.push_string(0).push_int(7).build_object(1).ret(true);
    let out = decompile_bytes(
        &a.into_bytes(),
        Version::V2Current,
        &strings,
        &test_map(),
        &no_swapped(),
    );
    assert_eq!(out.trim(), "return { k: 7 };");
}

#[test]
fn if_without_else_elides_the_else_branch() {
    let mut a = Asm::new();
    a.push_bool(true);
    let to_merge = a.jump_fwd(Op::JumpIfFalse);
    a.push_int(1).store_var(0, 0);
    a.patch_here(to_merge);
    a.ret(false);

    let expected = "\
if (true) {
  var var_0 = 1;
}
return;
";
    assert_eq!(decompile(&a.into_bytes()), expected);
}

#[test]
fn insane_variable_ids_are_normalized() {
    let mut a = Asm::new();
    a.load_var(5000, 20000).pop(); // both components out of sane bounds
    a.load_var(5000, 3).pop(); // scope normalizes to 0
    a.load_var(0, 3).pop(); // lands on the same normalized slot
    a.ret(false);
    let out = decompile(&a.into_bytes());
    assert!(out.contains("var_unknown_0;"), "got: {out}");
    assert_eq!(out.matches("var_0;").count(), 2, "got: {out}");
}

#[test]
fn unknown_opcode_becomes_placeholder_comment() {
    let mut bytes = vec![250u8];
    let mut a = Asm::new();
    a.ret(false);
    bytes.extend_from_slice(&a.into_bytes());
    let out = decompile(&bytes);
    assert_eq!(out, "/* UNKNOWN_250 */\nreturn;\n");
}

#[test]
fn trivial_literal_statements_are_dropped() {
    let mut a = Asm::new();
    a.push_undefined().pop().push_int(3).pop().push_null().pop().ret(false);
    assert_eq!(decompile(&a.into_bytes()), "return;\n");
}
