//! # livequiz
//!
//! Coordination library for time-boxed live quiz sessions. One teacher client
//! launches a session; many student clients join it concurrently through a
//! shared, eventually-consistent document store. The crate keeps that fleet of
//! independent clients in agreement about when the session started, what each
//! student must see, whether it has ended, and exactly-once submission,
//! despite clock skew, background-tab throttling, late joiners, and
//! teacher-triggered early termination.
//!
//! The store itself, page rendering, authentication, and quiz content
//! management are external: the store is consumed through the
//! [`DocumentStore`] trait, the background timer through [`clock`]'s
//! capability probe, and AI answer explanations through
//! [`ExplanationGenerator`].
//!
//! ## Overview
//!
//! - [`rng`] / [`randomize`]: seed-deterministic per-student shuffling with
//!   canonical position tracking.
//! - [`clock`]: drift-resistant countdown with a background-thread
//!   implementation and a host-driven fallback.
//! - [`session`]: session lifecycle, from creation to early termination.
//! - [`discovery`]: the join-time heuristic (auto-navigate vs. banner).
//! - [`taking`]: the taking/submission controller with its three independent
//!   termination triggers and once-only submission guard.
//! - [`history`]: attempt history and the retake policy.
//! - [`leaderboard`]: pure ranking over a session's attempts.
//!
//! [`DocumentStore`]: store::adapter::DocumentStore
//! [`ExplanationGenerator`]: explain::ExplanationGenerator

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use clock::{
    spawn_countdown, Countdown, CountdownConfig, CountdownEvent, ManualTimeSource,
    SystemTimeSource, TimeSource,
};
pub use discovery::{listen_for_active_quiz, DiscoveryConfig, JoinAction, JoinDecider};
pub use error::QuizError;
pub use explain::{ExplanationGenerator, QuestionReview, FALLBACK_EXPLANATION};
pub use history::{HistoryService, RetakeDefaults, RetakeEligibility};
pub use leaderboard::{quiz_leaderboard, rank_attempts, LeaderboardEntry};
pub use model::{
    Attempt, HistoricalAttemptRecord, Question, RetakePermission, ReviewedAnswer, Session,
};
pub use session::{SessionParams, SessionService, SessionStart, StartMode};
pub use store::adapter::{Document, DocumentStore, Filter, Subscription};
pub use store::memory::MemoryStore;
pub use taking::{
    SubmissionState, SubmitMode, SubmitOutcome, SubmitTrigger, TakingController,
    TakingControllerBuilder,
};

pub mod clock;
pub mod discovery;
pub mod error;
pub mod explain;
pub mod history;
pub mod leaderboard;
pub mod model;
pub mod prelude;
pub mod randomize;
pub mod rng;
pub mod session;
/// Store adapter seam and in-process implementations.
pub mod store {
    pub mod adapter;
    pub mod flaky;
    pub mod memory;
}
pub mod taking;
pub mod telemetry;

/// A convenience alias around `Result` for all fallible livequiz operations.
pub type QuizResult<T> = Result<T, QuizError>;

// #############
// # CORE TYPES #
// #############

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// A newtype over `String`: ids are opaque to this crate and compared
        /// only for equality. The wrapper prevents accidentally mixing the
        /// different id spaces (session vs. quiz vs. student vs. class).
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new id from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype! {
    /// Identifies one live quiz session.
    SessionId
}
id_newtype! {
    /// Identifies a quiz (the question set), stable across sessions.
    QuizId
}
id_newtype! {
    /// Identifies the class a session is launched for.
    ClassId
}
id_newtype! {
    /// Identifies a student.
    StudentId
}
id_newtype! {
    /// Identifies one submitted attempt.
    AttemptId
}

/// A point in wall-clock time, in milliseconds since the Unix epoch.
///
/// All coordination arithmetic is done on absolute timestamps: remaining time
/// is always recomputed as `end - now`, never decremented, so throttled or
/// delayed clients converge instead of drifting.
///
/// # Type Safety
///
/// `Timestamp` is a newtype wrapper around `i64` providing saturating
/// arithmetic helpers and compile-time separation from plain millisecond
/// durations (which stay `i64`).
///
/// # Examples
///
/// ```
/// use livequiz::Timestamp;
///
/// let start = Timestamp::from_millis(1_000);
/// let end = start.saturating_add_millis(120_000);
/// assert_eq!(end - start, 120_000);
/// assert_eq!(end.saturating_since(start), 120_000);
/// // Skewed clocks clamp to zero instead of going negative.
/// assert_eq!(start.saturating_since(end), 0);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Returns the underlying millisecond value.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp shifted forward by `millis`, saturating at the
    /// numeric bounds.
    #[inline]
    #[must_use]
    pub const fn saturating_add_millis(self, millis: i64) -> Self {
        Timestamp(self.0.saturating_add(millis))
    }

    /// Returns the milliseconds elapsed from `earlier` to `self`, clamped to
    /// zero when `earlier` is actually later (clock skew tolerance).
    #[inline]
    #[must_use]
    pub const fn saturating_since(self, earlier: Timestamp) -> i64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 {
            0
        } else {
            delta
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl std::ops::Add<i64> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: i64) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl std::ops::Sub<Timestamp> for Timestamp {
    type Output = i64;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl From<i64> for Timestamp {
    #[inline]
    fn from(value: i64) -> Self {
        Timestamp(value)
    }
}

impl From<Timestamp> for i64 {
    #[inline]
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

/// Lifecycle status of a [`Session`].
///
/// Sessions are created directly `Active` (there is no pending state) and the
/// transition to `Completed` is terminal: either the teacher ends the session
/// early (an explicit store write) or the clock expires (observed
/// independently by each client, never written). The status never reverts.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The session is running and accepting submissions.
    Active,
    /// The session has ended; submissions are closed.
    Completed,
}

impl SessionStatus {
    /// Returns `true` if the session has ended.
    #[inline]
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, SessionStatus::Completed)
    }

    /// Returns `true` if moving from `self` to `next` respects monotonicity
    /// (`Active -> Completed`, never the reverse).
    #[inline]
    #[must_use]
    pub const fn can_transition_to(self, next: SessionStatus) -> bool {
        match (self, next) {
            (SessionStatus::Active, _) => true,
            (SessionStatus::Completed, SessionStatus::Completed) => true,
            (SessionStatus::Completed, SessionStatus::Active) => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}
