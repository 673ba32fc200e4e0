//! SZ-004: Directive registry — name → handler factory, scoped per parent type.
//!
//! Every directive type names the scope its nested directives are resolved
//! in. The file itself resolves in [`ROOT_SCOPE`]. Registration happens once at
//! startup; lookups never allocate handlers.

use super::unit::Directive;
use indexmap::IndexMap;

/// Scope used for top-level directives.
pub const ROOT_SCOPE: &str = "file";

/// Builds a handler from the directive's argument text.
pub type Factory = fn(&str) -> Box<dyn Directive>;

/// Registration entry for one directive name within a scope.
#[derive(Clone, Copy)]
pub struct DirectiveSpec {
    pub factory: Factory,
    /// Scope for nested directives; `None` means the directive is a leaf.
    pub children: Option<&'static str>,
    /// One-line description for `stanza directives`.
    pub summary: &'static str,
}

impl std::fmt::Debug for DirectiveSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveSpec")
            .field("children", &self.children)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Registration table of directive scopes.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scopes: IndexMap<String, IndexMap<String, DirectiveSpec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` in `scope`. A later registration of the same name replaces the earlier one.
    pub fn register(&mut self, scope: &str, name: &str, spec: DirectiveSpec) -> &mut Self {
        self.scopes
            .entry(scope.to_string())
            .or_default()
            .insert(name.to_string(), spec);
        self
    }

    /// Resolve `name` for a parent whose nested scope is `scope`.
    ///
    /// `None` means the parent is a leaf and accepts no nested directives.
    pub fn lookup(&self, scope: Option<&str>, name: &str) -> Result<&DirectiveSpec, String> {
        let scope = scope.ok_or_else(|| {
            format!(
                "directive '{}' is nested under a directive that accepts no nested directives",
                name
            )
        })?;
        self.scopes
            .get(scope)
            .and_then(|entries| entries.get(name))
            .ok_or_else(|| format!("unknown directive '{}'", name))
    }

    /// Scope names in registration order.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Entries of one scope in registration order.
    pub fn entries(&self, scope: &str) -> impl Iterator<Item = (&str, &DirectiveSpec)> {
        self.scopes
            .get(scope)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(k, v)| (k.as_str(), v)))
    }
}
