//! Backend registry: named constructors for each pipeline capability.
//!
//! The binary decides which backends exist by registering them; the
//! configuration decides which one is used. Resolution never fails: an
//! unknown name or a constructor error falls back to the deterministic stub
//! and is logged once, at startup.
//!
//! ```text
//! BackendSelection { context: "fixtures", .. }
//!     |
//!     v
//! BackendRegistry::build --> Backends { context, engine, validator }
//!                                |
//!                                v
//!                          Orchestrator::new
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::{ContextDriver, ContextError, StubContextDriver};
use crate::engine::{PromptEngine, StubPromptEngine};
use crate::validator::{PlanValidator, StrictPlanValidator, StubPlanValidator};

/// Name of the always-available fallback backend for every capability.
pub const STUB_BACKEND: &str = "stub";

/// Errors raised while constructing a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Misconfigured(String),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Which backend to use for each capability, plus backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    pub context: String,
    pub engine: String,
    pub validator: String,
    /// Fixture table for the `fixtures` context backend.
    pub fixtures_path: Option<PathBuf>,
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self {
            context: STUB_BACKEND.to_string(),
            engine: STUB_BACKEND.to_string(),
            validator: STUB_BACKEND.to_string(),
            fixtures_path: None,
        }
    }
}

/// The concrete capabilities an orchestrator runs against.
#[derive(Clone)]
pub struct Backends {
    pub context: Arc<dyn ContextDriver>,
    pub engine: Arc<dyn PromptEngine>,
    pub validator: Arc<dyn PlanValidator>,
}

impl Backends {
    /// All three deterministic stubs.
    pub fn stub() -> Self {
        Self {
            context: Arc::new(StubContextDriver::new()),
            engine: Arc::new(StubPromptEngine::new()),
            validator: Arc::new(StubPlanValidator::new()),
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextDriver>) -> Self {
        self.context = context;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn PromptEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn PlanValidator>) -> Self {
        self.validator = validator;
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("context", &self.context.name())
            .field("engine", &self.engine.name())
            .field("validator", &self.validator.name())
            .finish()
    }
}

/// Constructor for a backend of type `T`.
pub type Factory<T> =
    Box<dyn Fn(&BackendSelection) -> Result<Arc<T>, BackendError> + Send + Sync>;

/// Named backend constructors, one table per capability.
#[derive(Default)]
pub struct BackendRegistry {
    context: HashMap<String, Factory<dyn ContextDriver>>,
    engine: HashMap<String, Factory<dyn PromptEngine>>,
    validator: HashMap<String, Factory<dyn PlanValidator>>,
}

impl BackendRegistry {
    /// Create an empty registry. Resolution against it always falls back.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend shipped in this crate.
    ///
    /// - context: `stub`, `fixtures`
    /// - engine: `stub`
    /// - validator: `stub`, `strict`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_context(STUB_BACKEND, |_| Ok(Arc::new(StubContextDriver::new())));
        registry.register_context("fixtures", |selection| {
            let path = selection.fixtures_path.as_deref().ok_or_else(|| {
                BackendError::Misconfigured("fixtures backend requires fixtures_path".to_string())
            })?;
            Ok(Arc::new(StubContextDriver::from_fixture_file(path)?))
        });
        registry.register_engine(STUB_BACKEND, |_| Ok(Arc::new(StubPromptEngine::new())));
        registry.register_validator(STUB_BACKEND, |_| Ok(Arc::new(StubPlanValidator::new())));
        registry.register_validator("strict", |_| Ok(Arc::new(StrictPlanValidator::new())));
        registry
    }

    /// Register a context driver constructor. Returns `true` if it replaced
    /// an existing registration.
    pub fn register_context<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn(&BackendSelection) -> Result<Arc<dyn ContextDriver>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.context
            .insert(name.to_string(), Box::new(factory))
            .is_some()
    }

    pub fn register_engine<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn(&BackendSelection) -> Result<Arc<dyn PromptEngine>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.engine.insert(name.to_string(), Box::new(factory)).is_some()
    }

    pub fn register_validator<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn(&BackendSelection) -> Result<Arc<dyn PlanValidator>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        self.validator
            .insert(name.to_string(), Box::new(factory))
            .is_some()
    }

    /// Registered names per capability, sorted.
    pub fn names(&self) -> RegisteredNames {
        RegisteredNames {
            context: sorted_keys(&self.context),
            engine: sorted_keys(&self.engine),
            validator: sorted_keys(&self.validator),
        }
    }

    /// Resolve every capability for `selection`.
    pub fn build(&self, selection: &BackendSelection) -> Backends {
        Backends {
            context: resolve(
                "context_driver",
                &selection.context,
                &self.context,
                selection,
                || Arc::new(StubContextDriver::new()),
            ),
            engine: resolve(
                "prompt_engine",
                &selection.engine,
                &self.engine,
                selection,
                || Arc::new(StubPromptEngine::new()),
            ),
            validator: resolve(
                "plan_validator",
                &selection.validator,
                &self.validator,
                selection,
                || Arc::new(StubPlanValidator::new()),
            ),
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.names();
        f.debug_struct("BackendRegistry")
            .field("context", &names.context)
            .field("engine", &names.engine)
            .field("validator", &names.validator)
            .finish()
    }
}

/// Sorted backend names, as returned by [`BackendRegistry::names`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredNames {
    pub context: Vec<String>,
    pub engine: Vec<String>,
    pub validator: Vec<String>,
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

fn resolve<T: ?Sized>(
    capability: &'static str,
    requested: &str,
    factories: &HashMap<String, Factory<T>>,
    selection: &BackendSelection,
    fallback: impl FnOnce() -> Arc<T>,
) -> Arc<T> {
    let result = match factories.get(requested) {
        Some(factory) => factory(selection),
        None => Err(BackendError::Misconfigured(format!(
            "backend '{requested}' is not registered"
        ))),
    };

    match result {
        Ok(backend) => {
            tracing::info!(capability, backend = requested, "backend_selected");
            backend
        }
        Err(e) => {
            tracing::warn!(
                capability,
                requested,
                backend = STUB_BACKEND,
                reason = %e,
                "backend_fallback"
            );
            fallback()
        }
    }
}
