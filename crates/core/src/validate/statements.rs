use super::scope::Binding;
use super::{Rule, Violation, Walker};
use crate::ast::{AssignTarget, ImportItem, Stmt, StmtKind};
use crate::policy::{self, BUILTIN_FUNCTIONS};

impl Walker<'_> {
    pub(super) fn check_block(&mut self, body: &[Stmt]) -> Result<(), Violation> {
        for stmt in body {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_nested(&mut self, body: &[Stmt], is_loop: bool) -> Result<(), Violation> {
        self.scopes.push();
        if is_loop {
            self.loops += 1;
        }
        let result = self.check_block(body);
        if is_loop {
            self.loops -= 1;
        }
        self.scopes.pop();
        result
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), Violation> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Import(items) => {
                for item in items {
                    self.check_import(item, line)?;
                }
                Ok(())
            }
            StmtKind::FromImport { module, names } => self.check_from_import(module, names, line),
            StmtKind::Let { name, value } => {
                self.check_binding(name, line)?;
                self.check_value(value)?;
                self.scopes.declare(name, Binding::Variable);
                Ok(())
            }
            StmtKind::Assign { target, value } => {
                match target {
                    AssignTarget::Name(name) => self.check_assign_name(name, line)?,
                    AssignTarget::Index { name, index } => {
                        self.check_assign_name(name, line)?;
                        self.check_value(index)?;
                    }
                }
                self.check_value(value)
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_value(cond)?;
                self.check_nested(then_body, false)?;
                match else_body {
                    Some(body) => self.check_nested(body, false),
                    None => Ok(()),
                }
            }
            StmtKind::While { cond, body } => {
                self.check_value(cond)?;
                self.check_nested(body, true)
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                self.check_binding(var, line)?;
                self.check_value(iterable)?;
                self.scopes.push();
                self.scopes.declare(var, Binding::Variable);
                self.loops += 1;
                let result = self.check_block(body);
                self.loops -= 1;
                self.scopes.pop();
                result
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loops == 0 {
                    let word = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(Violation::new(
                        Rule::UnsupportedConstruct,
                        line,
                        format!("'{}' outside of a loop", word),
                    ));
                }
                Ok(())
            }
            StmtKind::Return(value) => match value {
                Some(expr) => self.check_value(expr),
                None => Ok(()),
            },
            StmtKind::Expr(expr) => self.check_value(expr),
        }
    }

    fn check_import(&mut self, item: &ImportItem, line: u32) -> Result<(), Violation> {
        let cap = self.allowed_module(&item.module, line)?;
        let binding = item.binding();
        match self.scopes.resolve(binding) {
            Some(Binding::Module(existing)) if existing.name == cap.name => {}
            _ if item.alias.is_none() => {
                if BUILTIN_FUNCTIONS.contains(&binding) {
                    return Err(Violation::new(
                        Rule::Shadowing,
                        line,
                        format!("'{}' is a builtin function and cannot be rebound", binding),
                    ));
                }
            }
            _ => self.check_binding(binding, line)?,
        }
        self.scopes.declare(binding, Binding::Module(cap));
        Ok(())
    }

    fn check_from_import(
        &mut self,
        module: &str,
        names: &[String],
        line: u32,
    ) -> Result<(), Violation> {
        let cap = self.allowed_module(module, line)?;
        for name in names {
            if name == "*" {
                return Err(Violation::new(
                    Rule::UnsupportedConstruct,
                    line,
                    format!("wildcard import from '{}'; name each member", module),
                ));
            }
            self.check_ident(name, line, true)?;
            let Some(member) = cap.members.iter().copied().find(|m| *m == name.as_str()) else {
                return Err(Violation::new(
                    Rule::UnknownMember,
                    line,
                    format!(
                        "'{}' has no member '{}' (available: {})",
                        cap.name,
                        name,
                        cap.members.join(", ")
                    ),
                ));
            };
            match self.scopes.resolve(name) {
                Some(Binding::Member(c, m)) if c.name == cap.name && m == member => {}
                _ => self.check_binding(name, line)?,
            }
            self.scopes.declare(name, Binding::Member(cap, member));
        }
        Ok(())
    }

    /// The capability named by an import, if the policy allows it. Dotted
    /// paths never name a capability.
    fn allowed_module(
        &self,
        module: &str,
        line: u32,
    ) -> Result<&'static policy::Capability, Violation> {
        let cap = if self.policy.allows_import(module) {
            policy::capability(module)
        } else {
            None
        };
        cap.ok_or_else(|| {
            Violation::new(
                Rule::DisallowedImport,
                line,
                format!(
                    "import of '{}' is not allowed (allowed: {})",
                    module,
                    self.policy
                        .imports
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        })
    }

    fn check_assign_name(&self, name: &str, line: u32) -> Result<(), Violation> {
        self.check_ident(name, line, false)?;
        match self.scopes.resolve(name) {
            Some(Binding::Variable) => Ok(()),
            Some(Binding::Module(_)) | Some(Binding::Member(..)) => Err(Violation::new(
                Rule::Shadowing,
                line,
                format!("'{}' is an imported capability and cannot be reassigned", name),
            )),
            None if BUILTIN_FUNCTIONS.contains(&name) => Err(Violation::new(
                Rule::Shadowing,
                line,
                format!("'{}' is a builtin function and cannot be reassigned", name),
            )),
            None => Err(Violation::new(
                Rule::UndeclaredName,
                line,
                format!("assignment to undeclared name '{}'; declare it with let", name),
            )),
        }
    }
}
