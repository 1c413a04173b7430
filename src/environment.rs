//! Lexical scopes.
//!
//! An [`Environment`] is a cheap, shared handle to one scope. Scopes form a
//! chain through their parent links; the chain always ends at the library
//! scope holding the built-ins. Parent and import links are fixed when a scope
//! is created, so the graph of scopes never changes shape, only the bindings
//! inside each scope do.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;

/// Shared handle to a scope
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

struct Scope {
    kind: ScopeKind,
    bindings: RefCell<HashMap<String, Value>>,
}

enum ScopeKind {
    /// Built-in bindings; the root of every chain
    Library,
    /// Function, macro and `let` scopes, and the top-level scope of a package
    Standard {
        parent: Environment,
        package_boundary: bool,
        package_id: Option<String>,
    },
    /// Scope created by `import`, consulting other packages after its own chain
    Import {
        parent: Environment,
        imports: Vec<Environment>,
    },
}

impl Environment {
    /// Create the library scope. It cannot be modified afterwards.
    pub(crate) fn library(bindings: HashMap<String, Value>) -> Self {
        Environment(Rc::new(Scope {
            kind: ScopeKind::Library,
            bindings: RefCell::new(bindings),
        }))
    }

    /// Create an ordinary child scope, as used by functions, macros and `let`
    pub fn with_parent(parent: &Environment) -> Self {
        Self::standard(parent, false, None)
    }

    /// Create the top-level scope of a package.
    ///
    /// `package_id` is the canonical identifier imports are resolved
    /// against; `None` for a program that did not come from a provider.
    pub fn package(parent: &Environment, package_id: Option<String>) -> Self {
        Self::standard(parent, true, package_id)
    }

    /// Create an import scope over `parent` consulting `imports` in order
    pub fn with_imports(parent: &Environment, imports: Vec<Environment>) -> Self {
        Environment(Rc::new(Scope {
            kind: ScopeKind::Import {
                parent: parent.clone(),
                imports,
            },
            bindings: RefCell::new(HashMap::new()),
        }))
    }

    fn standard(parent: &Environment, package_boundary: bool, package_id: Option<String>) -> Self {
        Environment(Rc::new(Scope {
            kind: ScopeKind::Standard {
                parent: parent.clone(),
                package_boundary,
                package_id,
            },
            bindings: RefCell::new(HashMap::new()),
        }))
    }

    /// Whether `name` resolves anywhere in the applicable chain
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Resolve `name`: own bindings, then the parent chain, then (for import
    /// scopes) each imported package in order.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.0.bindings.borrow().get(name) {
            return Some(value.clone());
        }

        match &self.0.kind {
            ScopeKind::Library => None,
            ScopeKind::Standard { parent, .. } => parent.lookup(name),
            ScopeKind::Import { parent, imports } => parent
                .lookup(name)
                .or_else(|| imports.iter().find_map(|package| package.lookup(name))),
        }
    }

    /// Resolve `name`, failing if it is bound nowhere in the chain
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.lookup(name)
            .ok_or_else(|| Error::UnboundIdentifier(name.to_owned()))
    }

    /// Bind `name` in this scope, shadowing any binding further up the chain
    pub fn define(&self, name: impl Into<String>, value: Value) -> Result<(), Error> {
        let name = name.into();
        if let ScopeKind::Library = self.0.kind {
            return Err(Error::EvalError(format!(
                "cannot define {name} in the library scope"
            )));
        }
        self.0.bindings.borrow_mut().insert(name, value);
        Ok(())
    }

    /// Nearest enclosing package scope, this scope included.
    ///
    /// Function, macro, `let` and import scopes are skipped. The library
    /// scope is its own package scope.
    pub fn package_scope(&self) -> Environment {
        match &self.0.kind {
            ScopeKind::Library => self.clone(),
            ScopeKind::Standard {
                package_boundary: true,
                ..
            } => self.clone(),
            ScopeKind::Standard { parent, .. } | ScopeKind::Import { parent, .. } => {
                parent.package_scope()
            }
        }
    }

    /// Whether this scope is the top-level scope of a package
    pub fn is_package_boundary(&self) -> bool {
        matches!(
            self.0.kind,
            ScopeKind::Standard {
                package_boundary: true,
                ..
            }
        )
    }

    /// Canonical identifier of the package this scope belongs to, if any
    pub fn package_id(&self) -> Option<String> {
        match &self.package_scope().0.kind {
            ScopeKind::Standard { package_id, .. } => package_id.clone(),
            ScopeKind::Library | ScopeKind::Import { .. } => None,
        }
    }

    /// Names bound directly in this scope, sorted
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether both handles refer to the same scope
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            ScopeKind::Library => "library",
            ScopeKind::Standard {
                package_boundary: true,
                ..
            } => "package",
            ScopeKind::Standard { .. } => "standard",
            ScopeKind::Import { .. } => "import",
        };
        // Bindings may refer back to this scope through closures, so only
        // names are shown.
        f.debug_struct("Environment")
            .field("kind", &kind)
            .field("names", &self.local_names())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn root() -> Environment {
        let mut bindings = HashMap::new();
        bindings.insert("shared".to_owned(), val("library"));
        Environment::library(bindings)
    }

    #[test]
    fn test_lookup_walks_parent_chain_and_shadows() {
        let library = root();
        let package = Environment::package(&library, None);
        let inner = Environment::with_parent(&package);

        package.define("x", val(1)).unwrap();
        assert_eq!(inner.get("x").unwrap(), val(1));
        assert_eq!(inner.get("shared").unwrap(), val("library"));

        inner.define("x", val(2)).unwrap();
        assert_eq!(inner.get("x").unwrap(), val(2));
        assert_eq!(package.get("x").unwrap(), val(1));

        assert!(inner.contains("shared"));
        assert!(!inner.contains("missing"));
        assert_eq!(
            inner.get("missing").unwrap_err(),
            Error::UnboundIdentifier("missing".into())
        );
    }

    #[test]
    fn test_import_scope_consults_imports_last_in_order() {
        let library = root();

        let first = Environment::package(&library, Some("first".into()));
        first.define("a", val("first-a")).unwrap();
        first.define("only-first", val(1)).unwrap();

        let second = Environment::package(&library, Some("second".into()));
        second.define("a", val("second-a")).unwrap();
        second.define("b", val("second-b")).unwrap();
        second.define("local", val("from-import")).unwrap();

        let program = Environment::package(&library, None);
        program.define("local", val("from-parent")).unwrap();

        let scope = Environment::with_imports(&program, vec![first, second]);

        // First import containing the name wins
        assert_eq!(scope.get("a").unwrap(), val("first-a"));
        assert_eq!(scope.get("b").unwrap(), val("second-b"));
        assert_eq!(scope.get("only-first").unwrap(), val(1));
        // The parent chain is consulted before any import
        assert_eq!(scope.get("local").unwrap(), val("from-parent"));

        scope.define("local", val("own")).unwrap();
        assert_eq!(scope.get("local").unwrap(), val("own"));

        // Children of an import scope see the imports through it
        let nested = Environment::with_parent(&scope);
        assert_eq!(nested.get("b").unwrap(), val("second-b"));
        // The importing package does not
        assert!(!program.contains("b"));
    }

    #[test]
    fn test_package_scope_skips_ordinary_scopes() {
        let library = root();
        let package = Environment::package(&library, Some("pkg.lisp".into()));
        let imported = Environment::package(&library, Some("other.lisp".into()));
        let function_scope = Environment::with_parent(&package);
        let import_scope = Environment::with_imports(&function_scope, vec![imported]);
        let let_scope = Environment::with_parent(&import_scope);

        assert!(let_scope.package_scope().ptr_eq(&package));
        assert!(package.package_scope().ptr_eq(&package));
        assert!(library.package_scope().ptr_eq(&library));

        assert!(package.is_package_boundary());
        assert!(!let_scope.is_package_boundary());
        assert_eq!(let_scope.package_id(), Some("pkg.lisp".into()));
        assert_eq!(library.package_id(), None);
    }

    #[test]
    fn test_library_rejects_definitions() {
        let library = root();
        let err = library.define("shared", val(0)).unwrap_err();
        assert!(matches!(err, Error::EvalError(msg) if msg.contains("library")));
        assert_eq!(library.get("shared").unwrap(), val("library"));
    }

    #[test]
    fn test_local_names_and_debug() {
        let package = Environment::package(&root(), None);
        package.define("zeta", val(1)).unwrap();
        package.define("alpha", val(2)).unwrap();

        assert_eq!(package.local_names(), vec!["alpha", "zeta"]);
        assert_eq!(
            format!("{package:?}"),
            "Environment { kind: \"package\", names: [\"alpha\", \"zeta\"] }"
        );
    }
}
