//! # xylem-runtime
//!
//! The XSLT runtime of the Xylem engine.
//!
//! A compiled stylesheet arrives as a [`Stylesheet`] handle whose template
//! bodies, expressions and match patterns are opaque executables; the
//! runtime drives them over a source document:
//!
//! 1. **Grounded path** ([`Transformer`], [`TransformHandler`]): source
//!    events build a fully navigable tree, global variables initialize
//!    with forward-reference tolerance, and templates apply from the root
//!    (or from a named initial template).
//! 2. **Streaming path** ([`StreamingHandler`]): the document is never
//!    materialized; accumulators update around every element, the entry
//!    body executes once at the root element, and rules that need reverse
//!    axes trigger grounded subtree buffering.
//!
//! Both paths write result events through the deferred-start-tag output
//! handlers of `xylem-serializer`, guarded by the principal-output claim.

pub mod accumulator;
pub mod config;
pub mod context;
pub mod error;
pub mod grounded;
pub mod loader;
pub mod matcher;
pub mod pattern;
pub mod resource;
pub mod scope;
pub mod sink;
pub mod source;
pub mod space;
pub mod streaming;
pub mod stylesheet;
pub mod transformer;

pub use accumulator::AccumulatorManager;
pub use config::{ErrorHandling, TransformOptions};
pub use context::{Context, PrincipalOutput, RegexMatchState, VariableLookup};
pub use error::{EngineError, codes};
pub use grounded::GroundedExecutor;
pub use loader::DocumentLoader;
pub use matcher::{TemplateMatcher, builtin_action, is_builtin};
pub use pattern::{Pattern, SimplePattern};
pub use resource::{FileResourceProvider, InMemoryResourceProvider, ResourceProvider};
pub use scope::VariableScope;
pub use sink::{CollectingSink, Diagnostic, ErrorSink, LogSink, Severity};
pub use space::{NameTest, SpaceStripper};
pub use streaming::StreamingHandler;
pub use stylesheet::{
    AccumulatorDecl, AccumulatorRule, EmptyBody, Expr, FnBody, FnExpr, FunctionLibrary,
    GlobalVariable, Literal, ModeDecl, OnNoMatch, Stylesheet, TemplateBody, TemplateParam,
    TemplateRule,
};
pub use transformer::{TransformHandler, Transformer, collecting_transformer};
