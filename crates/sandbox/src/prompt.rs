//! Instruction text for the external script generator.
//!
//! The generator never sees the store; it sees this text, pasted by the
//! user. Everything it may call is listed from the same tables the
//! validator enforces, so the instructions cannot drift from the policy.

use std::fmt::Write;

use sift_core::policy::{self, BUILTIN_FUNCTIONS, VALUE_METHODS};
use sift_storage::SchemaDescriptor;

const LANGUAGE: &str = "\
Write a sift script. Sift is a small, dynamically typed language:
- statements end with `;`; blocks use braces: `if x > 1 { ... } else { ... }`,
  `while cond { ... }`, `for row in rows { ... }`, `break;`, `continue;`
- declare with `let name = expr;`, then assign with `name = expr;` or `name[key] = expr;`
- literals: null, true, false, 42, 3.5, \"text\", [1, 2], {\"key\": value}
- operators: + - * / % == != < <= > >= in and or not
- comments start with // or #
- the script MUST end by returning its result: `return value;`
  Return a frame for a table, or a single number/string for a scalar.";

const FORBIDDEN: &[&str] = &[
    "importing anything other than the modules listed above",
    "reading or writing files, the network, processes or environment variables",
    "modifying the store: only SELECT queries are permitted",
    "eval-style dynamic code, reflection, or any name starting with `__`",
    "passing a module around as a value (`let d = db;`)",
];

/// Render the full instruction text for `request` against the current
/// `schemas`.
pub fn build(request: &str, schemas: &[SchemaDescriptor]) -> String {
    let mut out = String::new();
    out.push_str(LANGUAGE);
    out.push_str("\n\nAvailable modules (import them first, e.g. `import db;`):\n");
    for capability in policy::CAPABILITIES {
        let _ = writeln!(
            out,
            "- {}: {}",
            capability.name,
            capability
                .members
                .iter()
                .map(|m| format!("{}.{}()", capability.name, m))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    let _ = writeln!(out, "\nBuiltin functions: {}", BUILTIN_FUNCTIONS.join(", "));
    let _ = writeln!(
        out,
        "Methods on frames, lists, maps and strings: {}",
        VALUE_METHODS.join(", ")
    );
    out.push_str(
        "`db.table(name)` returns a frame; `db.query(sql, [params])` runs a read-only \
         SELECT where each table is a view of the same name.\n",
    );

    out.push_str("\nNever use:\n");
    for item in FORBIDDEN {
        let _ = writeln!(out, "- {}", item);
    }

    out.push_str("\nTables in the store:\n");
    if schemas.is_empty() {
        out.push_str("(none yet: ingest data first)\n");
    }
    for schema in schemas {
        let columns = schema
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.ty.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "- {}({})", schema.table, columns);
    }

    out.push_str(
        "\nOutput ONLY the script text: no markdown fences, no explanation.\n\nRequest:\n",
    );
    out.push_str(request.trim());
    out.push('\n');
    out
}
