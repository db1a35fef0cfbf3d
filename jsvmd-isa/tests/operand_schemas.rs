use jsvmd_isa::{ALL_OPS, ArgKind, Op, Version};

#[test]
fn every_operand_kind_is_used_by_some_schema() {
    let kinds = [
        ArgKind::StringIndex,
        ArgKind::Dword,
        ArgKind::SignedDword,
        ArgKind::Double,
        ArgKind::Boolean,
        ArgKind::Address,
        ArgKind::Argc,
        ArgKind::Length,
        ArgKind::HasValue,
        ArgKind::HasFlags,
        ArgKind::Scope,
        ArgKind::Dest,
        ArgKind::Prefix,
        ArgKind::IsOp,
        ArgKind::CatchAddr,
        ArgKind::FinallyAddr,
        ArgKind::VarSlot,
    ];
    for kind in kinds {
        let used = ALL_OPS.iter().any(|op| {
            op.operand_schema(Version::V1Legacy).contains(&kind)
                || op.operand_schema(Version::V2Current).contains(&kind)
        });
        assert!(used, "{kind:?} appears in no schema");
    }
}

#[test]
fn operand_widths_are_fixed_and_nonzero() {
    for op in ALL_OPS {
        for version in [Version::V1Legacy, Version::V2Current] {
            for kind in op.operand_schema(version) {
                assert!(kind.width() >= 1);
            }
        }
    }
}

#[test]
fn only_regexp_and_try_push_are_version_sensitive() {
    for op in ALL_OPS {
        let v1 = op.operand_schema(Version::V1Legacy);
        let v2 = op.operand_schema(Version::V2Current);
        if op == Op::BuildRegexp || op == Op::TryPush {
            assert_ne!(v1, v2, "{} should differ across versions", op.mnemonic());
        } else {
            assert_eq!(v1, v2, "{} should not differ across versions", op.mnemonic());
        }
    }
}

#[test]
fn pure_expression_excludes_statement_ops() {
    for op in [Op::StoreVar, Op::SetProp, Op::Throw, Op::Return, Op::Debugger] {
        assert!(!op.is_pure_expression(), "{}", op.mnemonic());
    }
    for op in [Op::PushInt, Op::Add, Op::LoadVar, Op::GetProp, Op::Dup] {
        assert!(op.is_pure_expression(), "{}", op.mnemonic());
    }
}

#[test]
fn consume_table_covers_the_documented_consumers() {
    // Arithmetic, comparisons, bitwise, property get/set, method call,
    // store/assign.
    for op in [
        Op::Add,
        Op::Less,
        Op::BitXor,
        Op::GetProp,
        Op::SetProp,
        Op::CallMethod,
        Op::StoreVar,
        Op::AssignVar,
    ] {
        assert!(op.consumes_result(), "{}", op.mnemonic());
    }
    // Pushes never consume what came before them.
    for op in [Op::PushInt, Op::PushString, Op::LoadVar, Op::BuildArray] {
        assert!(!op.consumes_result(), "{}", op.mnemonic());
    }
}

#[test]
fn comparison_set_is_exactly_eight() {
    assert_eq!(ALL_OPS.iter().filter(|op| op.is_comparison()).count(), 8);
}

#[test]
fn binary_set_is_exactly_twenty_one() {
    assert_eq!(ALL_OPS.iter().filter(|op| op.is_binary()).count(), 21);
}
