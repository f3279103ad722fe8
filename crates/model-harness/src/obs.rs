//! Structured observability hooks for harness case lifecycles.
//!
//! This module provides:
//! - Case-scoped tracing spans via the `CaseSpan` RAII guard
//! - Emission functions for key lifecycle events: case start, state
//!   transition, distribution choice, case finish, teardown failure
//!
//! Events are emitted at `info!` level; set `RUST_LOG` to filter.

use tracing::info;

use crate::lifecycle::LifecycleState;

/// RAII guard that enters a span tagged with the case name and version.
///
/// # Example
///
/// ```ignore
/// let _span = CaseSpan::enter("testSimple", "1.9");
/// // every event until the guard drops carries case and version
/// ```
pub struct CaseSpan {
    _span: tracing::span::EnteredSpan,
}

impl CaseSpan {
    pub fn enter(case: &str, version: &str) -> Self {
        let span = tracing::info_span!("harness.case", case = %case, version = %version);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: case started.
pub fn emit_case_started(case: &str, version: &str, models: usize) {
    info!(event = "case.started", case = %case, version = %version, models = models);
}

/// Emit event: lifecycle state changed.
pub fn emit_state_transition(case: &str, from: LifecycleState, to: LifecycleState) {
    tracing::debug!(
        event = "case.transition",
        case = %case,
        from = %from,
        to = %to,
    );
}

/// Emit event: distribution source chosen for a version.
pub fn emit_distribution_selected(version: &str, source: &dyn std::fmt::Display, explicit: bool) {
    info!(
        event = "distribution.selected",
        version = %version,
        source = %source,
        explicit = explicit,
    );
}

/// Emit event: case finished with duration and verdict.
pub fn emit_case_finished(case: &str, version: &str, duration_ms: u64, passed: bool) {
    info!(
        event = "case.finished",
        case = %case,
        version = %version,
        duration_ms = duration_ms,
        passed = passed,
    );
}

/// Emit event: workspace could not be removed (warning level).
pub fn emit_teardown_failed(case: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "case.teardown_failed", case = %case, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_span_create() {
        let _span = CaseSpan::enter("testSimple", "1.9");
    }
}
