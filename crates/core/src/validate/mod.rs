//! Static validator: the fail-closed gate in front of every execution.
//!
//! The walker visits the AST in source order and stops at the first
//! violation. The [`Policy`] allow-list is the source of truth; the I/O and
//! dynamic-code block-lists only produce a more specific rule code for names
//! the allow-list would reject anyway.
//!
//! This is a syntactic check. It cannot observe runtime behaviour, so it is
//! a fast pre-filter; the worker process and the read-only store handle are
//! what actually contain a script.

mod expressions;
mod scope;
mod statements;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Script;
use crate::parser;
use crate::policy::{Policy, BUILTIN_FUNCTIONS, CAPABILITIES, DYNAMIC_NAMES, IO_NAMES};
use scope::Scopes;

/// Which rule rejected a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    Syntax,
    DisallowedImport,
    IoCall,
    DynamicCode,
    Reflection,
    UnknownFunction,
    UnknownMethod,
    UnknownMember,
    UndeclaredName,
    Shadowing,
    CapabilityEscape,
    UnsupportedConstruct,
}

impl Rule {
    pub fn code(self) -> &'static str {
        match self {
            Rule::Syntax => "syntax",
            Rule::DisallowedImport => "disallowed-import",
            Rule::IoCall => "io-call",
            Rule::DynamicCode => "dynamic-code",
            Rule::Reflection => "reflection",
            Rule::UnknownFunction => "unknown-function",
            Rule::UnknownMethod => "unknown-method",
            Rule::UnknownMember => "unknown-member",
            Rule::UndeclaredName => "undeclared-name",
            Rule::Shadowing => "shadowing",
            Rule::CapabilityEscape => "capability-escape",
            Rule::UnsupportedConstruct => "unsupported-construct",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: Rule,
    pub line: u32,
    pub detail: String,
}

impl Violation {
    pub(crate) fn new(rule: Rule, line: u32, detail: impl Into<String>) -> Self {
        Violation {
            rule,
            line,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] line {}: {}", self.rule, self.line, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(Violation),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(v) => Some(v),
        }
    }
}

/// Parse and vet `src` against `policy`. Pure: nothing is executed.
pub fn validate(src: &str, policy: &Policy) -> Verdict {
    let verdict = match parser::parse(src) {
        Ok(script) => match check_script(&script, policy) {
            Ok(()) => Verdict::Accepted,
            Err(v) => Verdict::Rejected(v),
        },
        Err(e) => Verdict::Rejected(Violation::new(Rule::Syntax, e.line, e.message)),
    };
    match &verdict {
        Verdict::Accepted => tracing::debug!("script accepted"),
        Verdict::Rejected(v) => {
            tracing::debug!(rule = %v.rule, line = v.line, detail = %v.detail, "script rejected")
        }
    }
    verdict
}

/// Vet an already parsed script.
pub fn check_script(script: &Script, policy: &Policy) -> Result<(), Violation> {
    let mut walker = Walker {
        policy,
        scopes: Scopes::new(),
        loops: 0,
    };
    walker.check_block(&script.body)
}

struct Walker<'p> {
    policy: &'p Policy,
    scopes: Scopes,
    /// Depth of enclosing `while`/`for` bodies.
    loops: usize,
}

impl Walker<'_> {
    /// Block-list and reflection checks shared by every identifier position.
    /// `io` is false for names being bound, which never reach the host.
    fn check_ident(&self, name: &str, line: u32, io: bool) -> Result<(), Violation> {
        if DYNAMIC_NAMES.contains(&name) {
            return Err(Violation::new(
                Rule::DynamicCode,
                line,
                format!("'{}' loads or inspects code at runtime", name),
            ));
        }
        if name.starts_with("__") {
            return Err(Violation::new(
                Rule::Reflection,
                line,
                format!("dunder name '{}' is not allowed", name),
            ));
        }
        if io && IO_NAMES.contains(&name) {
            return Err(Violation::new(
                Rule::IoCall,
                line,
                format!("'{}' performs file, network, process or environment I/O", name),
            ));
        }
        Ok(())
    }

    /// A name about to be bound by `let`, `for`, `import ... as` or
    /// `from ... import`.
    fn check_binding(&self, name: &str, line: u32) -> Result<(), Violation> {
        self.check_ident(name, line, false)?;
        if BUILTIN_FUNCTIONS.contains(&name) {
            return Err(Violation::new(
                Rule::Shadowing,
                line,
                format!("'{}' is a builtin function and cannot be rebound", name),
            ));
        }
        if CAPABILITIES.iter().any(|c| c.name == name) {
            return Err(Violation::new(
                Rule::Shadowing,
                line,
                format!("'{}' is a capability module and cannot be rebound", name),
            ));
        }
        match self.scopes.resolve(name) {
            Some(scope::Binding::Module(_)) | Some(scope::Binding::Member(..)) => {
                Err(Violation::new(
                    Rule::Shadowing,
                    line,
                    format!("'{}' is an imported capability and cannot be rebound", name),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(src: &str) -> Verdict {
        validate(src, &Policy::default())
    }

    fn rule_of(src: &str) -> Rule {
        match verdict(src) {
            Verdict::Rejected(v) => v.rule,
            Verdict::Accepted => panic!("expected rejection for:\n{}", src),
        }
    }

    fn assert_accepted(src: &str) {
        let v = verdict(src);
        assert!(v.is_accepted(), "expected acceptance, got {:?}", v);
    }

    // ── Accepted scripts ─────────────────────────────────────────────

    #[test]
    fn aggregate_over_the_query_handle_is_accepted() {
        assert_accepted(
            r#"
import db;
let sales = db.table("records");
return sales.sum("amount");
"#,
        );
    }

    #[test]
    fn grouped_report_with_loops_and_maps_is_accepted() {
        assert_accepted(
            r#"
import db, frame as f;
from db import query;
let rows = query("SELECT name, amount FROM records WHERE amount > ?", [5]).rows();
let out = [];
for r in rows {
    if r["amount"] >= 20 and not (r["name"] == "") {
        out.append({"name": r["name"].upper(), "amount": r["amount"]});
    } else if r["amount"] < 0 {
        continue;
    } else {
        print("small", r["name"]);
    }
}
let totals = f.from_rows(out).group_by("name").sum("amount");
return totals.sort("amount", false).head(10);
"#,
        );
    }

    #[test]
    fn while_loop_with_index_assignment_is_accepted() {
        assert_accepted(
            r#"
let counts = {"a": 0};
let i = 0;
while i < 3 {
    counts["a"] = counts["a"] + 1;
    i = i + 1;
}
return counts;
"#,
        );
    }

    // ── Imports ──────────────────────────────────────────────────────

    #[test]
    fn disallowed_import_is_rejected_in_every_form() {
        for src in [
            "import os;",
            "import os as o;",
            "import db, os;",
            "import os.path;",
            "import db.internal;",
            "from os import path;",
            "from os.path import join;",
            "import subprocess;",
        ] {
            let v = verdict(src);
            let violation = v.violation().unwrap_or_else(|| panic!("accepted: {}", src));
            assert_eq!(violation.rule, Rule::DisallowedImport, "{}", src);
            assert!(
                violation.detail.contains("os")
                    || violation.detail.contains("subprocess")
                    || violation.detail.contains("db.internal"),
                "{}: {}",
                src,
                violation.detail
            );
        }
    }

    #[test]
    fn narrowed_policy_rejects_removed_import() {
        let policy = Policy::narrowed(Some(&["db".to_string()]), None, None).expect("narrow");
        let v = validate("import frame;", &policy);
        assert_eq!(v.violation().map(|v| v.rule), Some(Rule::DisallowedImport));
    }

    #[test]
    fn wildcard_import_is_unsupported() {
        assert_eq!(rule_of("from db import *;"), Rule::UnsupportedConstruct);
    }

    #[test]
    fn from_import_of_unknown_member_is_rejected() {
        assert_eq!(rule_of("from db import execute;"), Rule::UnknownMember);
    }

    // ── Block-lists ──────────────────────────────────────────────────

    #[test]
    fn persistence_methods_are_io_calls() {
        let src = "import db;\nlet t = db.table(\"records\");\nt.to_csv(\"out.csv\");";
        let v = verdict(src);
        let violation = v.violation().expect("rejected");
        assert_eq!(violation.rule, Rule::IoCall);
        assert_eq!(violation.line, 3);
    }

    #[test]
    fn io_functions_are_io_calls() {
        assert_eq!(rule_of("open(\"x\");"), Rule::IoCall);
        assert_eq!(rule_of("let e = getenv(\"HOME\");"), Rule::IoCall);
        assert_eq!(rule_of("let t = [1]; let f = t.save;"), Rule::IoCall);
    }

    #[test]
    fn dynamic_code_is_rejected() {
        assert_eq!(rule_of("eval(\"1\");"), Rule::DynamicCode);
        assert_eq!(rule_of("__import__(\"os\");"), Rule::DynamicCode);
        assert_eq!(rule_of("let x = [1]; x.getattr(\"y\");"), Rule::DynamicCode);
    }

    #[test]
    fn dunder_names_are_reflection() {
        assert_eq!(rule_of("let __x = 1;"), Rule::Reflection);
        assert_eq!(rule_of("let x = [1]; return x.__class__;"), Rule::Reflection);
    }

    // ── Allow-list ───────────────────────────────────────────────────

    #[test]
    fn unknown_function_and_method() {
        assert_eq!(rule_of("return mystery(1);"), Rule::UnknownFunction);
        assert_eq!(rule_of("let x = [1]; return x.frobnicate();"), Rule::UnknownMethod);
        assert_eq!(rule_of("import db; return db.drop(\"records\");"), Rule::UnknownMember);
    }

    #[test]
    fn narrowed_function_list_is_enforced() {
        let policy =
            Policy::narrowed(None, Some(&["len".to_string()]), None).expect("narrow policy");
        let v = validate("return sum([1, 2]);", &policy);
        assert_eq!(v.violation().map(|v| v.rule), Some(Rule::UnknownFunction));
        assert!(validate("return len([1, 2]);", &policy).is_accepted());
    }

    #[test]
    fn capability_requires_import() {
        assert_eq!(rule_of("return db.table(\"records\");"), Rule::UndeclaredName);
        assert_eq!(rule_of("return missing;"), Rule::UndeclaredName);
        assert_eq!(rule_of("missing = 1;"), Rule::UndeclaredName);
    }

    #[test]
    fn block_scoping_hides_inner_names() {
        assert_eq!(
            rule_of("if true { let inner = 1; }\nreturn inner;"),
            Rule::UndeclaredName
        );
        assert_eq!(rule_of("for r in [1] { }\nreturn r;"), Rule::UndeclaredName);
    }

    #[test]
    fn let_cannot_see_itself() {
        assert_eq!(rule_of("let x = x;"), Rule::UndeclaredName);
    }

    // ── Capability handling ─────────────────────────────────────────

    #[test]
    fn rebinding_capabilities_or_builtins_is_shadowing() {
        assert_eq!(rule_of("let len = 3;"), Rule::Shadowing);
        assert_eq!(rule_of("import db; db = 1;"), Rule::Shadowing);
        assert_eq!(rule_of("import db as len;"), Rule::Shadowing);
        assert_eq!(rule_of("from db import query; let query = 1;"), Rule::Shadowing);
        assert_eq!(rule_of("for print in [1] { }"), Rule::Shadowing);
    }

    #[test]
    fn capabilities_cannot_escape_as_values() {
        assert_eq!(rule_of("import db; let h = db;"), Rule::CapabilityEscape);
        assert_eq!(rule_of("import db; return db;"), Rule::CapabilityEscape);
        assert_eq!(rule_of("import db; let q = db.query;"), Rule::CapabilityEscape);
        assert_eq!(rule_of("import db; print(db);"), Rule::CapabilityEscape);
        assert_eq!(rule_of("from db import query; let q = query;"), Rule::CapabilityEscape);
        assert_eq!(rule_of("let f = len;"), Rule::CapabilityEscape);
    }

    #[test]
    fn only_names_and_methods_are_callable() {
        assert_eq!(rule_of("let x = [1]; x[0]();"), Rule::UnsupportedConstruct);
        assert_eq!(rule_of("let f = 1; f();"), Rule::UnsupportedConstruct);
        assert_eq!(rule_of("import db; db();"), Rule::UnsupportedConstruct);
    }

    #[test]
    fn loop_control_outside_a_loop_is_unsupported() {
        assert_eq!(rule_of("break;"), Rule::UnsupportedConstruct);
        assert_eq!(rule_of("if true { continue; }"), Rule::UnsupportedConstruct);
        assert_accepted("for x in [1] { if x == 1 { break; } }");
    }

    #[test]
    fn plain_attribute_reads_are_unsupported() {
        assert_eq!(rule_of("let x = {\"a\": 1}; return x.a;"), Rule::UnsupportedConstruct);
    }

    // ── Verdict shape ───────────────────────────────────────────────

    #[test]
    fn syntax_errors_are_rejections_with_line() {
        let v = verdict("let x = 1;\nlet y = ;");
        let violation = v.violation().expect("rejected");
        assert_eq!(violation.rule, Rule::Syntax);
        assert_eq!(violation.line, 2);
    }

    #[test]
    fn first_violation_in_source_order_wins() {
        let v = verdict("let a = missing;\nimport os;");
        assert_eq!(v.violation().map(|v| v.rule), Some(Rule::UndeclaredName));
    }

    #[test]
    fn validation_is_deterministic() {
        let src = "import db;\nlet t = db.table('x');\nt.to_excel('y');";
        assert_eq!(verdict(src), verdict(src));
    }

    #[test]
    fn verdict_serializes_with_rule_code() {
        let json = serde_json::to_value(verdict("import os;")).expect("serialize");
        assert_eq!(json["verdict"], "rejected");
        assert_eq!(json["rule"], "disallowed-import");
        assert_eq!(json["line"], 1);
    }
}
