//! Convenience re-exports for the common embedding path.
//!
//! ```
//! use livequiz::prelude::*;
//! ```

pub use crate::clock::{
    spawn_countdown, Countdown, CountdownConfig, CountdownEvent, ManualTimeSource,
    SystemTimeSource, TimeSource,
};
pub use crate::discovery::{listen_for_active_quiz, DiscoveryConfig, JoinAction, JoinDecider};
pub use crate::error::QuizError;
pub use crate::explain::{ExplanationGenerator, QuestionReview};
pub use crate::history::{HistoryService, RetakeDefaults, RetakeEligibility};
pub use crate::leaderboard::{quiz_leaderboard, rank_attempts, LeaderboardEntry};
pub use crate::model::{
    Attempt, HistoricalAttemptRecord, Question, RetakePermission, ReviewedAnswer, Session,
};
pub use crate::session::{SessionParams, SessionService, SessionStart, StartMode};
pub use crate::store::adapter::{Document, DocumentStore, Filter, Subscription};
pub use crate::store::memory::MemoryStore;
pub use crate::taking::{
    SubmissionState, SubmitMode, SubmitOutcome, SubmitTrigger, TakingController,
    TakingControllerBuilder,
};
pub use crate::{
    AttemptId, ClassId, QuizId, QuizResult, SessionId, SessionStatus, StudentId, Timestamp,
};
