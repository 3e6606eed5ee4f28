//! Data model shared between teacher and student clients.
//!
//! These are plain serde carriers: the store enforces no schema, so every
//! invariant (monotonic status, `end_time >= start_time`, frozen seed) is
//! enforced by the code in this crate, never assumed from stored data.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{AttemptId, ClassId, QuizId, SessionId, SessionStatus, StudentId, Timestamp};

/// Store collection names used by this subsystem.
pub mod collections {
    /// Live session documents.
    pub const SESSIONS: &str = "live_sessions";
    /// Per-session attempt documents.
    pub const ATTEMPTS: &str = "live_attempts";
    /// Cross-session historical attempt records.
    pub const HISTORY: &str = "quiz_attempt_history";
    /// Retake permission records.
    pub const RETAKE_PERMISSIONS: &str = "retake_permissions";
}

/// Inline capacity for per-question option permutations. Questions rarely
/// carry more than this many options; longer lists spill to the heap.
pub const INLINE_OPTIONS: usize = 8;

/// A per-question permutation mapping shuffled option slot to canonical
/// option index.
pub type OptionOrder = SmallVec<[usize; INLINE_OPTIONS]>;

/// A quiz question in canonical (bank) order.
///
/// The canonical order is what the teacher authored; students never see it
/// directly; each student's view is derived by [`crate::randomize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable question identifier from the question bank.
    pub id: String,
    /// The question text.
    pub text: String,
    /// Answer options in canonical order.
    pub options: Vec<String>,
    /// Index of the correct option in canonical space.
    pub correct_index: usize,
}

/// One live quiz session, shared by the teacher and all participating students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier. Assigned by the store, or locally synthesized in
    /// degraded mode (see [`crate::session::StartMode`]).
    #[serde(default)]
    pub id: SessionId,
    /// The quiz this session runs.
    pub quiz_id: QuizId,
    /// Quiz title, denormalized for display.
    pub quiz_title: String,
    /// The class the session was launched for.
    pub class_id: ClassId,
    /// Class name, denormalized for display.
    pub class_name: String,
    /// The launching teacher.
    pub teacher_id: String,
    /// Teacher display name.
    pub teacher_name: String,
    /// Start of the session. Fixed at creation, never rewritten.
    pub start_time: Timestamp,
    /// End of the session: `start_time + duration`. Mutable only by an
    /// explicit early termination, and then only downward in effect.
    pub end_time: Timestamp,
    /// Nominal duration in seconds.
    pub duration_secs: u32,
    /// Opaque seed every per-student shuffle derives from. Fixed at creation;
    /// changing it would desynchronize the fleet.
    pub session_seed: String,
    /// Lifecycle status; monotonic `active -> completed`.
    pub status: SessionStatus,
    /// Number of questions in the quiz, denormalized for display.
    pub question_count: u32,
    /// Number of students expected, denormalized for display.
    pub total_students: u32,
    /// Best-effort lossy submission counter. Display only; the attempt
    /// collection is the authoritative record.
    #[serde(default)]
    pub submitted_count: u32,
}

impl Session {
    /// Returns `true` once `now` has passed the session's end time.
    #[must_use]
    pub fn has_expired(&self, now: Timestamp) -> bool {
        now > self.end_time
    }

    /// Milliseconds remaining until the end time, clamped at zero.
    #[must_use]
    pub fn remaining_ms(&self, now: Timestamp) -> i64 {
        self.end_time.saturating_since(now)
    }

    /// Milliseconds elapsed since the start time, clamped at zero to tolerate
    /// observer clocks that run slightly behind the teacher's.
    #[must_use]
    pub fn time_since_start_ms(&self, now: Timestamp) -> i64 {
        now.saturating_since(self.start_time)
    }

    /// Nominal duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        i64::from(self.duration_secs) * 1_000
    }

    /// Checks the structural invariants this crate maintains on every session
    /// document it writes: a non-negative time window and a non-empty seed.
    pub fn validate(&self) -> crate::QuizResult<()> {
        if self.end_time < self.start_time {
            return Err(crate::QuizError::InvalidRequest {
                info: format!(
                    "session {} has end_time {} before start_time {}",
                    self.id, self.end_time, self.start_time
                ),
            });
        }
        if self.session_seed.is_empty() {
            return Err(crate::QuizError::InvalidRequest {
                info: format!("session {} has an empty seed", self.id),
            });
        }
        Ok(())
    }
}

/// One student's submission for one session.
///
/// `answers` live in the *student's shuffled* index space; `question_order`
/// and `option_orders` carry the permutations needed to map them back to
/// canonical identity for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Attempt identifier (store-assigned, or local in degraded mode).
    #[serde(default)]
    pub id: AttemptId,
    /// The session this attempt belongs to.
    pub session_id: SessionId,
    /// The submitting student.
    pub student_id: StudentId,
    /// Student display name.
    pub student_name: String,
    /// Selected option slot per visible question position, in the student's
    /// shuffled space. `None` means unanswered.
    pub answers: Vec<Option<usize>>,
    /// Number of correct answers.
    pub score: u32,
    /// Submission time minus session start, clamped at zero.
    pub time_taken_ms: i64,
    /// Wall-clock submission time.
    pub submit_time: Timestamp,
    /// `true` when `time_taken_ms` exceeds the nominal duration.
    pub is_late: bool,
    /// Maps student-visible question position to canonical position.
    pub question_order: Vec<usize>,
    /// Per visible question: maps shuffled option slot to canonical index.
    pub option_orders: Vec<OptionOrder>,
}

/// One reviewed answer inside a [`HistoricalAttemptRecord`], in canonical space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedAnswer {
    /// The question this answer belongs to.
    pub question_id: String,
    /// Chosen option in canonical space; `None` means unanswered.
    pub chosen_canonical: Option<usize>,
    /// Whether the chosen option was correct.
    pub correct: bool,
}

/// Cross-session memory of one graded attempt, used by the retake policy.
///
/// Append-only: records are created after each attempt is scored and never
/// mutated, accumulating indefinitely per (student, quiz) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAttemptRecord {
    /// The student who took the attempt.
    pub student_id: StudentId,
    /// The quiz that was attempted.
    pub quiz_id: QuizId,
    /// The live session the attempt was taken in, if any.
    pub session_id: Option<SessionId>,
    /// 1-based attempt number for this (student, quiz) pair.
    pub attempt_number: u32,
    /// Per-question answers with correctness, in canonical space.
    pub answers: Vec<ReviewedAnswer>,
    /// Number of correct answers.
    pub score: u32,
    /// Number of questions in the attempted quiz.
    pub total_questions: u32,
    /// When the attempt completed.
    pub completed_at: Timestamp,
}

/// A teacher-set override of the default retake policy for one quiz.
///
/// Absence of any record implies the defaults (`enabled = true`,
/// `max_attempts = 3`). Resolution is by quiz id; see `HistoryService`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetakePermission {
    /// The quiz this permission applies to.
    pub quiz_id: QuizId,
    /// Optionally records which session the teacher set it from. Resolution
    /// treats the permission as quiz-scoped regardless.
    pub session_id: Option<SessionId>,
    /// Whether retakes are allowed at all.
    pub retakes_enabled: bool,
    /// Maximum attempts per student.
    pub max_attempts: u32,
    /// The teacher who set the permission.
    pub enabled_by: String,
    /// When the permission was set. Newest wins during resolution.
    pub enabled_at: Timestamp,
}
