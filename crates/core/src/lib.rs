//! sift-core: the report-script language and its static safety gate.
//!
//! Scripts are lexed and parsed into an [`ast::Script`], then vetted by
//! [`validate()`] against a [`Policy`] built from the host's fixed
//! capability table. The interpreter lives in `sift-eval` and walks the
//! same AST.
//!
//! # Public API
//!
//! - [`parse()`] -- source text to AST
//! - [`validate()`] -- source text to [`Verdict`]
//! - [`Policy`] -- the import/function/method allow-list
//! - [`ScriptError`] -- lexing and parsing failures

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod policy;
pub mod validate;

pub use ast::Script;
pub use error::ScriptError;
pub use parser::parse;
pub use policy::{Policy, PolicyError};
pub use validate::{check_script, validate, Rule, Verdict, Violation};
