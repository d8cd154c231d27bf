//! Attribute Paths
//!
//! Everything that happens before a tracker exists: resolving attributes into
//! cached accessors, compiling path expressions into segment lists and
//! validating that a compiled path can be observed.
//!
//! # Pipeline
//!
//! ```text
//! "x => x.next.is_true"
//!        │ PathExpression::parse
//!        ▼
//!   PathExpression ──► PathCompiler::compile ──► Arc<CompiledPath>
//!                                                   │ NotifyingPath::validate
//!                                                   ▼
//!                                            Arc<NotifyingPath> ──► Path<R>
//! ```
//!
//! All errors surface here. A `PathTracker` built from a `NotifyingPath`
//! has no recoverable error states.

mod accessor;
mod compiler;
mod expr;
mod notifying;

pub use accessor::{Accessor, AccessorCache, AccessorKind};
pub use compiler::{CompiledPath, PathCompiler, PathKey, PathSegment};
pub use expr::{Expr, Literal, PathExpression};
pub use notifying::NotifyingPath;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::TrackingConfig;
use crate::error::Result;
use crate::object::{ObjectRef, Reflect, TypeKey};
use crate::tracker::PathTracker;

/// A validated path rooted at `R`.
///
/// ```rust,ignore
/// let path = Path::<Node>::parse("x => x.next.is_true")?;
/// let tracker = path.track(&root)?;
/// let _subscription = tracker.subscribe(|change| println!("{:?}", change.source_and_value));
/// ```
pub struct Path<R> {
    inner: Arc<NotifyingPath>,
    config: TrackingConfig,
    _root: PhantomData<fn(&R)>,
}

impl<R: Reflect> Path<R> {
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, TrackingConfig::default())
    }

    pub fn parse_with(text: &str, config: TrackingConfig) -> Result<Self> {
        Self::from_expression_with(&PathExpression::parse(text)?, config)
    }

    pub fn from_expression(expression: &PathExpression) -> Result<Self> {
        Self::from_expression_with(expression, TrackingConfig::default())
    }

    pub fn from_expression_with(expression: &PathExpression, config: TrackingConfig) -> Result<Self> {
        let compiled = PathCompiler::compile(TypeKey::of::<R>(), expression)?;
        let inner = NotifyingPath::validate_with(&compiled, &config)?;
        Ok(Self {
            inner,
            config,
            _root: PhantomData,
        })
    }

    /// Re-validate under another configuration.
    pub fn with_config(&self, config: TrackingConfig) -> Result<Self> {
        let inner = NotifyingPath::validate_with(self.inner.compiled(), &config)?;
        Ok(Self {
            inner,
            config,
            _root: PhantomData,
        })
    }

    pub fn notifying_path(&self) -> &Arc<NotifyingPath> {
        &self.inner
    }

    pub fn compiled(&self) -> &Arc<CompiledPath> {
        self.inner.compiled()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Start tracking this path on `root`.
    pub fn track(&self, root: &Arc<R>) -> Result<PathTracker> {
        let root: ObjectRef = Arc::clone(root) as ObjectRef;
        PathTracker::with_config(&root, Arc::clone(&self.inner), self.config)
    }
}

impl<R> Clone for Path<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config,
            _root: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Path<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Path")
            .field("path", &self.inner.text())
            .field("config", &self.config)
            .finish()
    }
}
