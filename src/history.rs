//! Cross-session attempt history and the retake policy.
//!
//! History records are append-only: one per graded attempt, never mutated,
//! accumulating indefinitely per (student, quiz) pair. The retake policy
//! reads them to decide whether another attempt is allowed. Teachers can
//! override the defaults per quiz with a [`RetakePermission`] record; the
//! permission is resolved by quiz id alone, and when several records exist
//! (eventual consistency permits concurrent writes) the newest `enabled_at`
//! wins.

use std::sync::Arc;

use crate::model::{collections, HistoricalAttemptRecord, RetakePermission};
use crate::store::adapter::{encode_doc, DocumentStore, Filter};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, QuizId, QuizResult, StudentId};

/// Policy applied when no [`RetakePermission`] record exists for a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetakeDefaults {
    /// Whether retakes are allowed at all.
    pub enabled: bool,
    /// Maximum attempts per student.
    pub max_attempts: u32,
}

impl Default for RetakeDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
        }
    }
}

/// The answer to "may this student attempt this quiz again?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetakeEligibility {
    /// Whether another attempt is allowed right now.
    pub can_retake: bool,
    /// How many attempts the student has already made.
    pub attempt_count: u32,
    /// The effective attempt ceiling.
    pub max_attempts: u32,
    /// Human-readable reason when `can_retake` is `false`.
    pub reason: Option<String>,
}

/// Reads and writes attempt history and retake permissions.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn DocumentStore>,
    defaults: RetakeDefaults,
}

impl HistoryService {
    /// Creates a service with the standard defaults (retakes on, 3 attempts).
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_defaults(store, RetakeDefaults::default())
    }

    /// Creates a service with explicit fallback policy.
    #[must_use]
    pub fn with_defaults(store: Arc<dyn DocumentStore>, defaults: RetakeDefaults) -> Self {
        Self { store, defaults }
    }

    fn records_for(
        &self,
        student_id: &StudentId,
        quiz_id: &QuizId,
    ) -> QuizResult<Vec<HistoricalAttemptRecord>> {
        let docs = self.store.query(
            collections::HISTORY,
            &[
                Filter::eq("student_id", student_id.as_str()),
                Filter::eq("quiz_id", quiz_id.as_str()),
            ],
        )?;
        // One corrupt record must not hide the rest of the history.
        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode() {
                Ok(record) => Some(record),
                Err(err) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::Store,
                        "undecodable history record {}: {}",
                        doc.id,
                        err
                    );
                    None
                }
            })
            .collect())
    }

    /// Number of recorded attempts for one (student, quiz) pair.
    pub fn attempt_count(&self, student_id: &StudentId, quiz_id: &QuizId) -> QuizResult<u32> {
        Ok(self.records_for(student_id, quiz_id)?.len() as u32)
    }

    /// Appends one attempt record. Records are never updated or deleted.
    pub fn save_attempt(&self, record: &HistoricalAttemptRecord) -> QuizResult<()> {
        let body = encode_doc(record)?;
        self.store.create(collections::HISTORY, body)?;
        Ok(())
    }

    /// The record with the highest attempt number, if any.
    pub fn latest_attempt(
        &self,
        student_id: &StudentId,
        quiz_id: &QuizId,
    ) -> QuizResult<Option<HistoricalAttemptRecord>> {
        Ok(self
            .records_for(student_id, quiz_id)?
            .into_iter()
            .max_by_key(|record| (record.attempt_number, record.completed_at)))
    }

    /// Resolves the effective retake permission for a quiz: the record with
    /// the newest `enabled_at`, or `None` when no record exists.
    pub fn effective_permission(&self, quiz_id: &QuizId) -> QuizResult<Option<RetakePermission>> {
        let docs = self.store.query(
            collections::RETAKE_PERMISSIONS,
            &[Filter::eq("quiz_id", quiz_id.as_str())],
        )?;
        Ok(docs
            .iter()
            .filter_map(|doc| doc.decode::<RetakePermission>().ok())
            .max_by_key(|permission| permission.enabled_at))
    }

    /// Decides whether `student_id` may attempt `quiz_id` again.
    ///
    /// Holds for every `max_attempts >= 0`: once the count reaches the
    /// ceiling the answer stays `false` until a new permission raises it.
    pub fn can_retake(
        &self,
        student_id: &StudentId,
        quiz_id: &QuizId,
    ) -> QuizResult<RetakeEligibility> {
        let (enabled, max_attempts) = match self.effective_permission(quiz_id)? {
            Some(permission) => (permission.retakes_enabled, permission.max_attempts),
            None => (self.defaults.enabled, self.defaults.max_attempts),
        };
        let attempt_count = self.attempt_count(student_id, quiz_id)?;

        let (can_retake, reason) = if !enabled {
            (false, Some("Retakes disabled by teacher".to_owned()))
        } else if attempt_count >= max_attempts {
            (
                false,
                Some(format!("Maximum {} attempts reached", max_attempts)),
            )
        } else {
            (true, None)
        };

        Ok(RetakeEligibility {
            can_retake,
            attempt_count,
            max_attempts,
            reason,
        })
    }

    /// Records a teacher-set retake permission for a quiz.
    pub fn set_retake_permission(&self, permission: &RetakePermission) -> QuizResult<()> {
        let body = encode_doc(permission)?;
        self.store.create(collections::RETAKE_PERMISSIONS, body)?;
        Ok(())
    }
}

impl std::fmt::Debug for HistoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryService")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}
