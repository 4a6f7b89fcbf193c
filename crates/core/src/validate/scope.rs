use std::collections::HashMap;

use crate::policy::Capability;

/// What a name in scope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Binding {
    /// An imported capability module, e.g. `db` after `import db`.
    Module(&'static Capability),
    /// A capability member bound by `from db import query`.
    Member(&'static Capability, &'static str),
    /// A script-declared variable.
    Variable,
}

/// Block-scoped name table. The outermost frame is the script body.
pub(super) struct Scopes {
    frames: Vec<HashMap<String, Binding>>,
}

impl Scopes {
    pub(super) fn new() -> Self {
        Scopes {
            frames: vec![HashMap::new()],
        }
    }

    pub(super) fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(super) fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub(super) fn declare(&mut self, name: &str, binding: Binding) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), binding);
        }
    }

    pub(super) fn resolve(&self, name: &str) -> Option<Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }
}
