//! Scripts as they arrive from a generator, through the public API only.

use sift_core::{parse, validate, Policy, Rule, Verdict};

fn rejected(src: &str) -> sift_core::Violation {
    match validate(src, &Policy::default()) {
        Verdict::Rejected(v) => v,
        Verdict::Accepted => panic!("expected rejection for:\n{}", src),
    }
}

#[test]
fn markdown_fences_are_a_syntax_rejection() {
    let v = rejected("```\nimport db;\nreturn db.tables();\n```\n");
    assert_eq!(v.rule, Rule::Syntax);
    assert_eq!(v.line, 1);
}

#[test]
fn syntax_errors_carry_their_line() {
    let v = rejected("import db;\nlet t = db.table(\"records\"\nreturn t;\n");
    assert_eq!(v.rule, Rule::Syntax);
    assert!(v.line >= 2, "line {}", v.line);
    assert!(parse("let x = ;").is_err());
}

#[test]
fn first_violation_in_source_order_wins() {
    let v = rejected("let a = 1;\nlet b = open(\"f\");\nimport os;\n");
    assert_eq!(v.rule, Rule::IoCall);
    assert_eq!(v.line, 2);
}

#[test]
fn violation_serializes_with_rule_code() {
    let v = rejected("import os;");
    let json = serde_json::to_value(Verdict::Rejected(v)).expect("json");
    assert_eq!(json["verdict"], "rejected");
    assert_eq!(json["rule"], "disallowed-import");
    assert_eq!(json["line"], 1);
}

#[test]
fn validation_is_deterministic_and_pure() {
    let src = "import db;\nreturn db.table(\"records\").count();";
    assert_eq!(
        validate(src, &Policy::default()),
        validate(src, &Policy::default())
    );
    assert!(validate(src, &Policy::default()).is_accepted());
}

#[test]
fn every_default_capability_member_is_importable() {
    for cap in sift_core::policy::CAPABILITIES {
        for member in cap.members {
            let src = format!("from {} import {};\nreturn 1;", cap.name, member);
            assert!(
                validate(&src, &Policy::default()).is_accepted(),
                "{}",
                src
            );
        }
    }
}

#[test]
fn pathologically_deep_scripts_are_syntax_rejections() {
    let depth = 100_000;
    let parens = format!("return {}1{};", "(".repeat(depth), ")".repeat(depth));
    let chain = format!("import db;\nreturn {}1;", "1 + ".repeat(200_000));
    let lists = format!("return {}{};", "[".repeat(depth), "]".repeat(depth));
    let blocks = format!("{}{}", "while true { ".repeat(depth), "} ".repeat(depth));
    for src in [&parens, &chain, &lists, &blocks] {
        let v = rejected(src);
        assert_eq!(v.rule, Rule::Syntax, "{}", v);
    }
}

#[test]
fn nesting_limit_leaves_room_for_real_scripts() {
    let depth = sift_core::parser::MAX_NESTING / 4;
    let src = format!(
        "import db;\nlet total = {}db.table(\"records\").count(){};\nreturn total;",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    assert!(validate(&src, &Policy::default()).is_accepted(), "{}", src);
}
