use super::scope::Binding;
use super::{Rule, Violation, Walker};
use crate::ast::{Expr, ExprKind};
use crate::policy::{BUILTIN_FUNCTIONS, VALUE_METHODS};

impl Walker<'_> {
    /// Check an expression in value position.
    pub(super) fn check_value(&mut self, expr: &Expr) -> Result<(), Violation> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_) => Ok(()),
            ExprKind::Name(name) => self.check_name_value(name, line),
            ExprKind::List(items) => {
                for item in items {
                    self.check_value(item)?;
                }
                Ok(())
            }
            ExprKind::Map(entries) => {
                for (_, value) in entries {
                    self.check_value(value)?;
                }
                Ok(())
            }
            ExprKind::Unary { operand, .. } => self.check_value(operand),
            ExprKind::Binary { left, right, .. } => {
                self.check_value(left)?;
                self.check_value(right)
            }
            ExprKind::Index { object, index } => {
                self.check_value(object)?;
                self.check_value(index)
            }
            ExprKind::Member { object, name } => {
                if let Some(cap) = self.module_of(object) {
                    self.check_ident(name, line, true)?;
                    return Err(Violation::new(
                        Rule::CapabilityEscape,
                        line,
                        format!(
                            "'{}.{}' must be called, not used as a value",
                            cap, name
                        ),
                    ));
                }
                self.check_value(object)?;
                self.check_ident(name, line, true)?;
                Err(Violation::new(
                    Rule::UnsupportedConstruct,
                    line,
                    format!("attribute read '.{}'; use indexing or a method call", name),
                ))
            }
            ExprKind::Call { callee, args } => {
                self.check_callee(callee, line)?;
                for arg in args {
                    self.check_value(arg)?;
                }
                Ok(())
            }
        }
    }

    fn check_name_value(&self, name: &str, line: u32) -> Result<(), Violation> {
        self.check_ident(name, line, false)?;
        match self.scopes.resolve(name) {
            Some(Binding::Variable) => Ok(()),
            Some(Binding::Module(cap)) => Err(Violation::new(
                Rule::CapabilityEscape,
                line,
                format!("capability module '{}' cannot be used as a value", cap.name),
            )),
            Some(Binding::Member(cap, member)) => Err(Violation::new(
                Rule::CapabilityEscape,
                line,
                format!("'{}.{}' must be called, not used as a value", cap.name, member),
            )),
            None if BUILTIN_FUNCTIONS.contains(&name) => Err(Violation::new(
                Rule::CapabilityEscape,
                line,
                format!("builtin '{}' must be called, not used as a value", name),
            )),
            None => {
                self.check_ident(name, line, true)?;
                Err(Violation::new(
                    Rule::UndeclaredName,
                    line,
                    format!("'{}' is not declared", name),
                ))
            }
        }
    }

    fn check_callee(&mut self, callee: &Expr, line: u32) -> Result<(), Violation> {
        match &callee.kind {
            ExprKind::Name(name) => self.check_function_call(name, line),
            ExprKind::Member { object, name } => {
                if let Some(cap) = self.module_of(object) {
                    self.check_ident(name, line, true)?;
                    let exposed = crate::policy::capability(cap)
                        .is_some_and(|c| c.members.contains(&name.as_str()));
                    if !exposed {
                        return Err(Violation::new(
                            Rule::UnknownMember,
                            line,
                            format!("capability '{}' has no member '{}'", cap, name),
                        ));
                    }
                    return Ok(());
                }
                self.check_value(object)?;
                self.check_ident(name, line, true)?;
                if !self.policy.allows_method(name) {
                    let reason = if VALUE_METHODS.contains(&name.as_str()) {
                        "is not enabled"
                    } else {
                        "is not a known method"
                    };
                    return Err(Violation::new(
                        Rule::UnknownMethod,
                        line,
                        format!("method '{}' {}", name, reason),
                    ));
                }
                Ok(())
            }
            _ => Err(Violation::new(
                Rule::UnsupportedConstruct,
                line,
                "only named functions and methods can be called",
            )),
        }
    }

    fn check_function_call(&self, name: &str, line: u32) -> Result<(), Violation> {
        self.check_ident(name, line, true)?;
        match self.scopes.resolve(name) {
            Some(Binding::Member(..)) => Ok(()),
            Some(Binding::Module(cap)) => Err(Violation::new(
                Rule::UnsupportedConstruct,
                line,
                format!("capability module '{}' is not callable", cap.name),
            )),
            Some(Binding::Variable) => Err(Violation::new(
                Rule::UnsupportedConstruct,
                line,
                format!("'{}' is a variable, not a function", name),
            )),
            None if self.policy.allows_function(name) => Ok(()),
            None => Err(Violation::new(
                Rule::UnknownFunction,
                line,
                format!("function '{}' is not available", name),
            )),
        }
    }

    /// The capability name if `object` is a bare name bound to an imported
    /// module.
    fn module_of(&self, object: &Expr) -> Option<&'static str> {
        match &object.kind {
            ExprKind::Name(name) => match self.scopes.resolve(name) {
                Some(Binding::Module(cap)) => Some(cap.name),
                _ => None,
            },
            _ => None,
        }
    }
}
