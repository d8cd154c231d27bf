//! Path Compiler
//!
//! Turns a `PathExpression` into an ordered list of accessors, one per
//! segment, resolved against the static value type of the previous segment.
//!
//! # Caching
//!
//! Compiled paths are cached process-wide by a normalized key: the root type
//! plus the sequence of attribute names. Surface syntax never reaches the key,
//! so `x => x.next.value`, `|n| n.next.value`, `this.next.value` and
//! `next.value` compiled for the same root type all return the same
//! `Arc<CompiledPath>`. Since the root type and the names determine every
//! declaring type, this key is equivalent to the (declaring type, attribute)
//! sequence.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use smallvec::SmallVec;

use super::accessor::{Accessor, AccessorCache};
use super::expr::{Expr, Literal, PathExpression};
use crate::error::{Error, Result};
use crate::object::TypeKey;

/// Syntax-free identity of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    root: TypeKey,
    attributes: SmallVec<[Arc<str>; 4]>,
}

impl PathKey {
    pub fn root(&self) -> TypeKey {
        self.root
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|name| name.as_ref())
    }
}

/// One hop of a compiled path.
#[derive(Debug, Clone)]
pub struct PathSegment {
    position: usize,
    accessor: Arc<Accessor>,
    previous: Option<usize>,
}

impl PathSegment {
    /// 0-based position in the path.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn accessor(&self) -> &Arc<Accessor> {
        &self.accessor
    }

    /// Position of the previous segment; `None` for the first.
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }
}

/// An immutable, cached, compiled path.
#[derive(Debug)]
pub struct CompiledPath {
    key: PathKey,
    segments: Vec<PathSegment>,
    text: String,
}

impl CompiledPath {
    pub fn key(&self) -> &PathKey {
        &self.key
    }

    pub fn root_type(&self) -> TypeKey {
        self.key.root
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn segment(&self, position: usize) -> Option<&PathSegment> {
        self.segments.get(position)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Compiled paths always have at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Type of the value at the end of the path.
    pub fn value_type(&self) -> Option<TypeKey> {
        self.segments.last().map(|segment| segment.accessor.value_type())
    }

    /// Normalized text, e.g. `Link.next.is_true`.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CompiledPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The process-wide path compiler.
pub struct PathCompiler;

static COMPILED: OnceLock<DashMap<PathKey, Arc<CompiledPath>>> = OnceLock::new();

fn compiled() -> &'static DashMap<PathKey, Arc<CompiledPath>> {
    COMPILED.get_or_init(DashMap::new)
}

impl PathCompiler {
    /// Compile `expression` against the root type `root`.
    pub fn compile(root: TypeKey, expression: &PathExpression) -> Result<Arc<CompiledPath>> {
        let mut attributes = SmallVec::new();
        collect_attributes(&expression.body, &mut attributes)?;
        if attributes.is_empty() {
            return Err(Error::UnsupportedPathShape {
                expression: expression.to_string(),
                reason: "the path must read at least one attribute".to_string(),
            });
        }

        let key = PathKey { root, attributes };
        if let Some(existing) = compiled().get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let path = Arc::new(build(key.clone())?);
        tracing::debug!(path = %path.text, segments = path.len(), "compiled attribute path");
        Ok(Arc::clone(compiled().entry(key).or_insert(path).value()))
    }

    /// Parse and compile in one step.
    pub fn compile_str(root: TypeKey, text: &str) -> Result<Arc<CompiledPath>> {
        Self::compile(root, &PathExpression::parse(text)?)
    }

    pub fn cached_count() -> usize {
        compiled().len()
    }
}

fn build(key: PathKey) -> Result<CompiledPath> {
    let mut segments = Vec::with_capacity(key.attributes.len());
    let mut current = key.root;
    let mut text = key.root.name().to_string();

    for (position, name) in key.attributes.iter().enumerate() {
        let accessor = AccessorCache::get_or_create(&current, name)?;
        current = accessor.value_type();
        text.push('.');
        text.push_str(name);
        segments.push(PathSegment {
            position,
            accessor,
            previous: position.checked_sub(1),
        });
    }

    Ok(CompiledPath {
        key,
        segments,
        text,
    })
}

/// Flatten a member chain into attribute names, root first.
fn collect_attributes(expr: &Expr, out: &mut SmallVec<[Arc<str>; 4]>) -> Result<()> {
    let unsupported = |reason: &str| Error::UnsupportedPathShape {
        expression: expr.to_string(),
        reason: reason.to_string(),
    };

    match expr {
        Expr::Parameter { .. } | Expr::Captured { .. } | Expr::This => Ok(()),
        Expr::Member { target, name } => {
            collect_attributes(target, out)?;
            out.push(Arc::from(name.as_str()));
            Ok(())
        }
        Expr::Index { target, index } => match index.as_ref() {
            Expr::Literal {
                value: Literal::Str(name),
            } => {
                collect_attributes(target, out)?;
                out.push(Arc::from(name.as_str()));
                Ok(())
            }
            _ => Err(unsupported("only string-literal indexers name an attribute")),
        },
        Expr::Call { .. } => Err(unsupported("method calls are not attribute reads")),
        Expr::Literal { .. } => Err(unsupported("a constant cannot root a path")),
        Expr::Unary { .. } | Expr::Binary { .. } => {
            Err(unsupported("computed expressions are not attribute reads"))
        }
    }
}
