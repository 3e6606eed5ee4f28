//! Soft-failure reporting for contract violations and degraded operation.
//!
//! Several parts of this library deliberately degrade instead of failing hard:
//! an out-of-range correct index is clamped, the lossy `submitted_count`
//! increment may be dropped, the background timer may be unavailable. Those
//! events are not `Err` values (the operation still produces a usable result)
//! but they must never be silent. This module gives them a structured shape.
//!
//! By default violations are logged via `tracing`. Tests (and embedders that
//! want programmatic access) can route them into a [`CollectingObserver`].

use parking_lot::Mutex;
use std::fmt;

/// How severe a reported violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationSeverity {
    /// Unexpected but handled; the operation continued with a defined fallback.
    Warning,
    /// A contract was broken; the operation continued but results may be degraded.
    Error,
}

/// Which part of the coordination contract was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Invalid configuration or parameters (empty ranges, out-of-range indices).
    Configuration,
    /// A best-effort store interaction was lost (lossy counter, history append).
    Store,
    /// Countdown/clock irregularities (spawn fallback, skewed timestamps).
    Timing,
    /// Submission-path irregularities (duplicate attempt detected, late trigger).
    Submission,
}

/// A single reported violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecViolation {
    /// Severity of the violation.
    pub severity: ViolationSeverity,
    /// The contract area the violation belongs to.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
    /// `file!():line!()` of the report site.
    pub location: &'static str,
}

impl SpecViolation {
    /// Creates a new violation record.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}/{:?}] {} (at {})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives reported violations.
pub trait ViolationObserver: Send + Sync {
    /// Called once per reported violation.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Built-in observer that logs violations via the `tracing` crate.
///
/// `Warning` severity maps to `tracing::warn!`, `Error` to `tracing::error!`.
/// All fields are emitted as structured tracing fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        match violation.severity {
            ViolationSeverity::Warning => tracing::warn!(
                kind = ?violation.kind,
                location = violation.location,
                "{}",
                violation.message
            ),
            ViolationSeverity::Error => tracing::error!(
                kind = ?violation.kind,
                location = violation.location,
                "{}",
                violation.message
            ),
        }
    }
}

/// Observer that stores violations in memory for later inspection.
///
/// Intended for tests that assert on degraded-path behavior.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<SpecViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collecting observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Removes and returns all collected violations.
    #[must_use]
    pub fn take(&self) -> Vec<SpecViolation> {
        std::mem::take(&mut *self.violations.lock())
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Reports a violation via the default [`TracingObserver`].
///
/// ```
/// use livequiz::report_violation;
/// use livequiz::telemetry::{ViolationKind, ViolationSeverity};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::Timing,
///     "countdown fallback engaged"
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}
