//! Packages and the interpreter host.
//!
//! A package is one source unit evaluated in its own package scope. The
//! [`Interpreter`] owns the cache of evaluated packages, keyed by canonical
//! identifier, so each package runs at most once no matter how often it is
//! imported. Finding and reading package sources is delegated to a
//! [`SourceProvider`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Expression, Value};
use crate::builtinops::create_library;
use crate::environment::Environment;
use crate::evaluator::eval;
use crate::parser::parse_program;
use crate::{Config, Error};

/// Locates and reads package sources
pub trait SourceProvider {
    /// Canonical identifier for `requested` as imported from the package
    /// `current` (`None` for the entry program)
    fn canonicalize(&self, current: Option<&str>, requested: &str) -> Result<String, Error>;

    /// Source text of the package with the given canonical identifier
    fn load(&self, canonical: &str) -> Result<String, Error>;

    /// Canonicalize and load in one step
    fn resolve(&self, current: Option<&str>, requested: &str) -> Result<(String, String), Error> {
        let canonical = self.canonicalize(current, requested)?;
        let source = self.load(&canonical)?;
        Ok((canonical, source))
    }
}

/// Packages on the filesystem.
///
/// Names are paths. A relative name is resolved against the directory of the
/// importing package, or against the root directory for the entry program.
/// Canonical identifiers are absolute paths with symlinks resolved.
#[derive(Debug, Clone)]
pub struct FileSourceProvider {
    root: PathBuf,
}

impl FileSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSourceProvider { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceProvider for FileSourceProvider {
    fn canonicalize(&self, current: Option<&str>, requested: &str) -> Result<String, Error> {
        let base = current
            .and_then(|package| Path::new(package).parent())
            .unwrap_or(&self.root);
        let path = fs::canonicalize(base.join(requested))
            .map_err(|e| Error::import_error(requested, e))?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn load(&self, canonical: &str) -> Result<String, Error> {
        fs::read_to_string(canonical).map_err(|e| Error::import_error(canonical, e))
    }
}

/// Packages held in memory, keyed by name. Names are used as-is.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    sources: HashMap<String, String>,
}

impl MemorySourceProvider {
    /// Add a package, builder style
    pub fn with_source(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl SourceProvider for MemorySourceProvider {
    fn canonicalize(&self, _current: Option<&str>, requested: &str) -> Result<String, Error> {
        if self.sources.contains_key(requested) {
            Ok(requested.to_owned())
        } else {
            Err(Error::import_error(requested, "no such package"))
        }
    }

    fn load(&self, canonical: &str) -> Result<String, Error> {
        self.sources
            .get(canonical)
            .cloned()
            .ok_or_else(|| Error::import_error(canonical, "no such package"))
    }
}

/// Evaluated packages by canonical identifier
#[derive(Debug, Default)]
pub struct PackageCache {
    packages: HashMap<String, Environment>,
}

impl PackageCache {
    pub fn get(&self, canonical: &str) -> Option<Environment> {
        self.packages.get(canonical).cloned()
    }

    pub fn insert(&mut self, canonical: String, scope: Environment) {
        self.packages.insert(canonical, scope);
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.packages.contains_key(canonical)
    }

    /// Canonical identifiers of every cached package, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.packages.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// In-memory output sink whose contents stay readable after it is handed to
/// an [`Interpreter`]
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Interpreter state shared by every evaluation: the library scope, the
/// package cache, the source provider, limits and the output sink.
pub struct Interpreter {
    library: Environment,
    packages: PackageCache,
    provider: Box<dyn SourceProvider>,
    config: Config,
    output: Box<dyn Write>,
    depth: usize,
    /// Packages currently being evaluated, outermost first
    loading: Vec<String>,
}

impl Interpreter {
    /// Create an interpreter reading packages from `provider` and printing to
    /// stdout
    pub fn new(provider: impl SourceProvider + 'static) -> Self {
        Interpreter {
            library: create_library(),
            packages: PackageCache::default(),
            provider: Box::new(provider),
            config: Config::default(),
            output: Box::new(io::stdout()),
            depth: 0,
            loading: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Redirect `print` output
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared library scope holding the built-ins
    pub fn library(&self) -> &Environment {
        &self.library
    }

    pub fn packages(&self) -> &PackageCache {
        &self.packages
    }

    /// A fresh package scope for a program that did not come from the
    /// provider; its imports resolve against the provider's root
    pub fn program_scope(&self) -> Environment {
        Environment::package(&self.library, None)
    }

    /// Run `source` as a program in a fresh package scope and return the
    /// value of its last top-level form
    pub fn run_program(&mut self, source: &str) -> Result<Value, Error> {
        let scope = self.program_scope();
        self.run_in(source, &scope)
    }

    /// Run `source` in an existing scope, keeping its definitions; the REPL
    /// uses this to carry state from one line to the next
    pub fn run_in(&mut self, source: &str, scope: &Environment) -> Result<Value, Error> {
        let program = parse_program(source, &self.config)?;
        self.eval_top_level(&program, scope)
    }

    /// Load and evaluate the entry package `name` through the provider,
    /// returning its scope
    pub fn run_package(&mut self, name: &str) -> Result<Environment, Error> {
        self.import_package(None, name)
    }

    /// Resolve `requested` from the package `current` and return its scope,
    /// evaluating it first if it is not cached yet
    pub fn import_package(
        &mut self,
        current: Option<&str>,
        requested: &str,
    ) -> Result<Environment, Error> {
        let canonical = self.provider.canonicalize(current, requested)?;

        if let Some(scope) = self.packages.get(&canonical) {
            debug!(package = %canonical, "package served from cache");
            return Ok(scope);
        }

        if self.loading.contains(&canonical) {
            let mut cycle = self.loading.clone();
            cycle.push(canonical.clone());
            return Err(Error::import_error(
                requested,
                format!("circular import: {}", cycle.join(" -> ")),
            ));
        }

        debug!(package = %canonical, requested, "loading package");
        let source = self.provider.load(&canonical)?;
        let program = parse_program(&source, &self.config)?;
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(package = %canonical, tree = %program.to_json(), "parsed package");
        }

        let scope = Environment::package(&self.library, Some(canonical.clone()));
        self.loading.push(canonical.clone());
        let result = self.eval_top_level(&program, &scope);
        self.loading.pop();
        result?;

        debug!(package = %canonical, names = ?scope.local_names(), "package evaluated");
        self.packages.insert(canonical, scope.clone());
        Ok(scope)
    }

    /// Evaluate each top-level form in order, returning the last value
    fn eval_top_level(&mut self, program: &Expression, scope: &Environment) -> Result<Value, Error> {
        let forms = match program {
            Expression::Compound(forms) => forms.as_slice(),
            single => std::slice::from_ref(single),
        };

        let mut last = Value::Nothing;
        for form in forms {
            last = eval(form, scope, self)?;
        }
        Ok(last)
    }

    /// Write one line of `print` output
    pub(crate) fn print_line(&mut self, text: &str) -> Result<(), Error> {
        writeln!(self.output, "{text}")
            .and_then(|()| self.output.flush())
            .map_err(|e| Error::EvalError(format!("print failed: {e}")))
    }

    pub(crate) fn enter_eval(&mut self) -> Result<(), Error> {
        if self.depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_eval(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use pretty_assertions::assert_eq;

    fn interpreter(provider: MemorySourceProvider) -> (Interpreter, OutputBuffer) {
        let output = OutputBuffer::default();
        let interp = Interpreter::new(provider).with_output(output.clone());
        (interp, output)
    }

    #[test]
    fn test_memory_provider() {
        let provider = MemorySourceProvider::default().with_source("a", "(def x 1)\n");
        assert_eq!(provider.canonicalize(Some("b"), "a").unwrap(), "a");
        assert_eq!(
            provider.resolve(None, "a").unwrap(),
            ("a".to_owned(), "(def x 1)\n".to_owned())
        );
        assert!(matches!(
            provider.canonicalize(None, "b"),
            Err(Error::ImportError { package, .. }) if package == "b"
        ));
    }

    #[test]
    fn test_packages_evaluate_once() {
        let provider = MemorySourceProvider::default()
            .with_source("counter", "(print \"loading counter\") (def count 1)\n");
        let (mut interp, output) = interpreter(provider);

        let first = interp.run_package("counter").unwrap();
        let second = interp.import_package(Some("elsewhere"), "counter").unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(output.contents(), "loading counter\n");
        assert_eq!(interp.packages().names(), vec!["counter"]);
        assert_eq!(first.get("count").unwrap(), val(1));
        assert!(first.is_package_boundary());
        assert_eq!(first.package_id().as_deref(), Some("counter"));
    }

    #[test]
    fn test_circular_import_is_an_error() {
        let provider = MemorySourceProvider::default()
            .with_source("a", "(import \"b\" 1)\n")
            .with_source("b", "(import \"a\" 2)\n");
        let (mut interp, _) = interpreter(provider);

        let err = interp.run_package("a").unwrap_err();
        match &err {
            Error::ImportError { package, reason } => {
                assert_eq!(package, "a");
                assert_eq!(reason, "circular import: a -> b -> a");
            }
            other => panic!("expected ImportError, got {other:?}"),
        }

        // Nothing was cached and the loading stack is clear
        assert!(interp.packages().is_empty());
        assert!(interp.loading.is_empty());
    }

    #[test]
    fn test_failed_package_is_not_cached() {
        let provider = MemorySourceProvider::default().with_source("broken", "(def x (head 1))\n");
        let (mut interp, _) = interpreter(provider);

        assert!(interp.run_package("broken").is_err());
        assert!(!interp.packages().contains("broken"));
    }

    #[test]
    fn test_run_program_returns_last_value() {
        let (mut interp, output) = interpreter(MemorySourceProvider::default());

        assert_eq!(interp.run_program("").unwrap(), Value::Nothing);
        assert_eq!(
            interp.run_program("(def a 2) (print \"a is \" a) (* a 21)\n").unwrap(),
            val(42)
        );
        assert_eq!(output.contents(), "a is 2\n");

        // Each run gets a fresh package scope
        assert!(matches!(
            interp.run_program("a\n"),
            Err(Error::UnboundIdentifier(name)) if name == "a"
        ));
    }

    #[test]
    fn test_config_reaches_parser() {
        let (interp, _) = interpreter(MemorySourceProvider::default());
        let mut lenient = interp.with_config(Config {
            lenient_parens: true,
            ..Config::default()
        });
        assert_eq!(lenient.run_program("(+ 1 (* 2 3 ").unwrap(), val(7));

        let (mut strict, _) = interpreter(MemorySourceProvider::default());
        assert!(matches!(
            strict.run_program("(+ 1 (* 2 3 "),
            Err(Error::ParseError(_))
        ));
    }
}
