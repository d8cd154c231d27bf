//! Notifying Paths
//!
//! A `NotifyingPath` is a compiled path that has been checked to be
//! observable end to end: every segment must be declared on a reference type
//! that raises change notifications. The terminal segment may be exempted
//! from the notification requirement through
//! `TrackingConfig::require_notifying_terminal`.
//!
//! Validation reports every offending segment at once. Validated paths are
//! cached by (path identity, terminal requirement), so two equivalent
//! declarations share one `Arc<NotifyingPath>`.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::compiler::{CompiledPath, PathKey, PathSegment};
use crate::config::TrackingConfig;
use crate::error::{Error, ProblemKind, Result, SegmentProblem};
use crate::object::TypeKey;

/// A compiled path whose segments can all be observed.
#[derive(Debug)]
pub struct NotifyingPath {
    compiled: Arc<CompiledPath>,
    require_notifying_terminal: bool,
}

type ValidatedKey = (PathKey, bool);

static VALIDATED: OnceLock<DashMap<ValidatedKey, Arc<NotifyingPath>>> = OnceLock::new();

fn validated() -> &'static DashMap<ValidatedKey, Arc<NotifyingPath>> {
    VALIDATED.get_or_init(DashMap::new)
}

impl NotifyingPath {
    /// Validate with the default configuration.
    pub fn validate(compiled: &Arc<CompiledPath>) -> Result<Arc<NotifyingPath>> {
        Self::validate_with(compiled, &TrackingConfig::default())
    }

    pub fn validate_with(
        compiled: &Arc<CompiledPath>,
        config: &TrackingConfig,
    ) -> Result<Arc<NotifyingPath>> {
        let key = (compiled.key().clone(), config.require_notifying_terminal);
        if let Some(existing) = validated().get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let problems = problems(compiled, config.require_notifying_terminal);
        if !problems.is_empty() {
            tracing::debug!(path = %compiled, problems = problems.len(), "path failed validation");
            return Err(Error::PathValidationFailed {
                path: compiled.text().to_string(),
                problems,
            });
        }

        let path = Arc::new(NotifyingPath {
            compiled: Arc::clone(compiled),
            require_notifying_terminal: config.require_notifying_terminal,
        });
        Ok(Arc::clone(validated().entry(key).or_insert(path).value()))
    }

    pub fn compiled(&self) -> &Arc<CompiledPath> {
        &self.compiled
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.compiled.segments()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn root_type(&self) -> TypeKey {
        self.compiled.root_type()
    }

    pub fn text(&self) -> &str {
        self.compiled.text()
    }

    pub fn requires_notifying_terminal(&self) -> bool {
        self.require_notifying_terminal
    }

    pub fn cached_count() -> usize {
        validated().len()
    }
}

/// Collect at most one problem per segment, value types first.
fn problems(compiled: &CompiledPath, require_notifying_terminal: bool) -> Vec<SegmentProblem> {
    let last = compiled.len().saturating_sub(1);
    compiled
        .segments()
        .iter()
        .filter_map(|segment| {
            let accessor = segment.accessor();
            let declaring = accessor.declaring_type();
            let kind = if declaring.is_value_type() {
                ProblemKind::ValueType
            } else if !declaring.supports_change_notification()
                && (segment.position() != last || require_notifying_terminal)
            {
                ProblemKind::NotNotifying
            } else {
                return None;
            };
            Some(SegmentProblem {
                position: segment.position() + 1,
                attribute: accessor.name().to_string(),
                type_name: declaring.name().to_string(),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Link, Shape};
    use crate::path::PathCompiler;

    fn compile<R: crate::object::Reflect>(text: &str) -> Arc<CompiledPath> {
        PathCompiler::compile_str(TypeKey::of::<R>(), text).unwrap()
    }

    #[test]
    fn notifying_chains_validate_once() {
        let compiled = compile::<Link>("x => x.next.is_true");
        let first = NotifyingPath::validate(&compiled).unwrap();
        let second = NotifyingPath::validate(&compile::<Link>("|n| n.next.is_true")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        assert!(first.requires_notifying_terminal());
    }

    #[test]
    fn every_offending_segment_is_reported() {
        let compiled = compile::<Shape>("x => x.origin.owner.flag");
        let err = NotifyingPath::validate(&compiled).unwrap_err();
        let Error::PathValidationFailed { path, problems } = err else {
            panic!("expected a validation failure");
        };

        assert_eq!(path, "Shape.origin.owner.flag");
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].position, 2);
        assert_eq!(problems[0].kind, ProblemKind::ValueType);
        assert_eq!(problems[0].type_name, "Point");
        assert_eq!(problems[1].position, 3);
        assert_eq!(problems[1].kind, ProblemKind::NotNotifying);
        assert_eq!(problems[1].attribute, "flag");
    }

    #[test]
    fn plain_terminal_is_allowed_when_configured() {
        let compiled = compile::<Shape>("x => x.plain.flag");
        assert!(NotifyingPath::validate(&compiled).is_err());

        let relaxed = TrackingConfig {
            require_notifying_terminal: false,
            ..TrackingConfig::default()
        };
        let path = NotifyingPath::validate_with(&compiled, &relaxed).unwrap();
        assert!(!path.requires_notifying_terminal());

        // The relaxed variant is cached separately from the strict one.
        let strict_ok = compile::<Link>("x => x.next");
        let strict = NotifyingPath::validate(&strict_ok).unwrap();
        let loose = NotifyingPath::validate_with(&strict_ok, &relaxed).unwrap();
        assert!(!Arc::ptr_eq(&strict, &loose));
    }

    #[test]
    fn value_type_terminal_is_always_rejected() {
        let relaxed = TrackingConfig {
            require_notifying_terminal: false,
            ..TrackingConfig::default()
        };
        let err = NotifyingPath::validate_with(&compile::<Shape>("x => x.origin.x"), &relaxed)
            .unwrap_err();
        assert!(matches!(err, Error::PathValidationFailed { ref problems, .. } if problems.len() == 1));
    }
}
