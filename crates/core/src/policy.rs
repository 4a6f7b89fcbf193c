//! Capability table and the allow-list policy derived from it.
//!
//! The host provides exactly the symbols listed here; the interpreter in
//! `sift-eval` implements the same names. A [`Policy`] can only narrow
//! this table, never extend it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A host-provided module a script may `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

/// Read-only query handle on the store.
pub const DB: Capability = Capability {
    name: "db",
    members: &["tables", "columns", "table", "query"],
};

/// Tabular-data library.
pub const FRAME: Capability = Capability {
    name: "frame",
    members: &["from_rows", "new", "concat"],
};

pub const CAPABILITIES: &[Capability] = &[DB, FRAME];

pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "len", "str", "int", "float", "round", "abs", "min", "max", "sum", "range", "keys", "sorted",
    "print",
];

pub const VALUE_METHODS: &[&str] = &[
    // frames and grouped frames
    "rows",
    "columns",
    "count",
    "column",
    "select",
    "where",
    "sort",
    "head",
    "group_by",
    "sum",
    "mean",
    "min",
    "max",
    "distinct",
    "with_column",
    "rename",
    "join",
    // lists, maps, strings
    "len",
    "contains",
    "append",
    "get",
    "set",
    "keys",
    "values",
    "lower",
    "upper",
    "strip",
    "starts_with",
    "ends_with",
    "replace",
    "split",
];

/// Names that perform file, network, process or environment I/O in common
/// scripting ecosystems. Used to give a sharper rejection reason; the
/// allow-list rejects them regardless.
pub const IO_NAMES: &[&str] = &[
    "open", "read", "write", "read_file", "write_file", "readlines", "writelines", "save",
    "dump", "export", "to_csv", "to_excel", "to_json", "to_parquet", "to_pickle", "to_sql",
    "to_html", "to_clipboard", "to_feather", "to_hdf", "to_markdown", "read_csv", "read_excel",
    "read_sql", "remove", "unlink", "rename_file", "rmdir", "mkdir", "makedirs", "chmod",
    "system", "spawn", "popen", "subprocess", "fork", "kill", "exit", "getenv", "putenv",
    "setenv", "environ", "env", "socket", "connect", "urlopen", "request", "fetch", "download",
    "upload", "sleep",
];

/// Names that load, evaluate or introspect code at runtime.
pub const DYNAMIC_NAMES: &[&str] = &[
    "eval", "exec", "execfile", "compile", "__import__", "load", "loads", "loadstring", "require",
    "include", "import_module", "reload", "getattr", "setattr", "delattr", "hasattr", "globals", "locals",
    "vars", "dir", "type", "builtins", "reflect", "pickle", "marshal",
];

pub fn capability(name: &str) -> Option<&'static Capability> {
    CAPABILITIES.iter().find(|c| c.name == name)
}

// ──────────────────────────────────────────────
// Policy
// ──────────────────────────────────────────────

/// The allow-list the validator enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub imports: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub methods: BTreeSet<String>,
}

/// A narrowing request named a symbol the host does not provide.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{name}' in allow-list (the host provides: {provided})")]
pub struct PolicyError {
    pub kind: &'static str,
    pub name: String,
    pub provided: String,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            imports: CAPABILITIES.iter().map(|c| c.name.to_string()).collect(),
            functions: BUILTIN_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
            methods: VALUE_METHODS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Policy {
    /// Narrow the default table. `None` keeps the full set for that kind.
    pub fn narrowed(
        imports: Option<&[String]>,
        functions: Option<&[String]>,
        methods: Option<&[String]>,
    ) -> Result<Self, PolicyError> {
        let full = Policy::default();
        Ok(Policy {
            imports: narrow("import", &full.imports, imports)?,
            functions: narrow("function", &full.functions, functions)?,
            methods: narrow("method", &full.methods, methods)?,
        })
    }

    pub fn allows_import(&self, module: &str) -> bool {
        self.imports.contains(module)
    }

    pub fn allows_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn allows_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }
}

fn narrow(
    kind: &'static str,
    full: &BTreeSet<String>,
    requested: Option<&[String]>,
) -> Result<BTreeSet<String>, PolicyError> {
    let Some(requested) = requested else {
        return Ok(full.clone());
    };
    let mut out = BTreeSet::new();
    for name in requested {
        if !full.contains(name) {
            return Err(PolicyError {
                kind,
                name: name.clone(),
                provided: full.iter().cloned().collect::<Vec<_>>().join(", "),
            });
        }
        out.insert(name.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_the_full_capability_table() {
        let policy = Policy::default();
        assert!(policy.allows_import("db"));
        assert!(policy.allows_import("frame"));
        assert!(!policy.allows_import("os"));
        assert!(policy.allows_function("len"));
        assert!(policy.allows_method("group_by"));
    }

    #[test]
    fn narrowing_keeps_only_requested_names() {
        let policy = Policy::narrowed(Some(&["db".to_string()]), None, None).expect("narrow");
        assert!(policy.allows_import("db"));
        assert!(!policy.allows_import("frame"));
        assert!(policy.allows_function("sum"));
    }

    #[test]
    fn narrowing_cannot_extend_the_table() {
        let err = Policy::narrowed(Some(&["os".to_string()]), None, None).unwrap_err();
        assert_eq!(err.kind, "import");
        assert_eq!(err.name, "os");
    }

    #[test]
    fn block_lists_never_overlap_the_allow_list() {
        let policy = Policy::default();
        for name in IO_NAMES.iter().chain(DYNAMIC_NAMES) {
            assert!(!policy.allows_function(name), "{} is allowed", name);
            assert!(!policy.allows_method(name), "{} is allowed", name);
        }
    }
}
