//! Tether Core
//!
//! Live tracking of attribute paths over observable object graphs. Declare a
//! path such as `x => x.next.next.is_true` once, attach it to a root
//! instance, and get one notification every time the value at the end of
//! the path changes, including when any intermediate link is replaced.
//!
//! # Architecture
//!
//! - `object`: the observable object model (type descriptions, values,
//!   change notification)
//! - `path`: accessor cache, path parsing, compilation and validation
//! - `tracker`: the per-root tracker chain and its outward event
//! - `config`: tracking options
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{compile_and_validate, Value};
//!
//! let path = compile_and_validate::<Node>("x => x.next.is_true")?;
//! let tracker = path.track(&root)?;
//!
//! let _subscription = tracker.subscribe(|change| {
//!     println!("now {:?}", change.source_and_value.value);
//! });
//!
//! next.set_is_true(true);
//! // prints: now Some(Bool(true))
//! ```

pub mod config;
pub mod error;
pub mod object;
pub mod path;
pub mod tracker;

#[cfg(test)]
mod fixtures;

use std::sync::Arc;

pub use config::TrackingConfig;
pub use error::{Error, ProblemKind, Result, SegmentProblem};
pub use object::{
    AttributeChanged, ChangeNotifier, Object, ObjectRef, Reflect, Subscription, TypeBuilder,
    TypeKey, Value,
};
pub use path::{NotifyingPath, Path, PathExpression};
pub use tracker::{PathChanged, PathTracker, SourceAndValue};

/// Parse, compile and validate `text` for root type `R`.
pub fn compile_and_validate<R: Reflect>(text: &str) -> Result<Path<R>> {
    Path::parse(text)
}

/// Start tracking `path` on `root`.
pub fn create_tracker(root: &ObjectRef, path: &Arc<NotifyingPath>) -> Result<PathTracker> {
    PathTracker::new(root, Arc::clone(path))
}
