//! Session lifecycle: create, fetch, observe, terminate early.
//!
//! A session is created directly `active` with a fixed window
//! (`end_time = start_time + duration`) and a frozen seed. After creation
//! only two fields ever change: `status` (monotonically, to `completed`) and
//! `end_time` (only by an explicit early termination, and only downward in
//! effect). Natural expiry is *observed* by each client from the clock, never
//! written back, so a crashed teacher client cannot strand students.
//!
//! Creation is the first place the degraded mode shows up: when the store
//! write fails, the session still starts locally (students simply cannot
//! discover it) and the caller is told so via [`StartMode`] instead of a
//! buried log line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::TimeSource;
use crate::model::{collections, Session};
use crate::store::adapter::{encode_doc, DocumentStore, Filter, Subscription};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{
    report_violation, ClassId, QuizError, QuizId, QuizResult, SessionId, SessionStatus, Timestamp,
};

/// Everything the teacher provides to launch a session.
///
/// Timing and the seed are filled in by [`SessionService::start_session`];
/// passing an explicit `session_seed` is intended for tests that need
/// reproducible shuffles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// The quiz to run.
    pub quiz_id: QuizId,
    /// Quiz title, denormalized into the session document.
    pub quiz_title: String,
    /// The class to launch for.
    pub class_id: ClassId,
    /// Class display name.
    pub class_name: String,
    /// The launching teacher.
    pub teacher_id: String,
    /// Teacher display name.
    pub teacher_name: String,
    /// Session length in seconds. Must be positive.
    pub duration_secs: u32,
    /// Number of questions in the quiz.
    pub question_count: u32,
    /// Number of students expected.
    pub total_students: u32,
    /// Explicit seed override; `None` generates one.
    pub session_seed: Option<String>,
}

/// How a started session is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// The session document was created in the store; students can discover it.
    Stored,
    /// The store write failed. The session runs locally for the teacher only;
    /// students will not be notified.
    DegradedLocal,
}

/// A started session together with how it is backed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    /// The session, with its store-assigned (or locally synthesized) id.
    pub session: Session,
    /// Whether the session reached the store.
    pub mode: StartMode,
}

impl SessionStart {
    /// Returns `true` when the session runs in degraded local-only mode.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.mode == StartMode::DegradedLocal
    }
}

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates an opaque session seed. Uniqueness matters more than entropy
/// quality here: the seed only diversifies shuffles, it is not a secret.
fn generate_seed(now: Timestamp) -> String {
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0);
    format!("{:x}-{:x}-{:x}", now.as_millis(), nanos, counter)
}

/// Creates, fetches, observes, and terminates live sessions.
///
/// Cheap to clone; all clones share the same store and time source.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn DocumentStore>,
    time: Arc<dyn TimeSource>,
}

impl SessionService {
    /// Creates a service over the given store and time source.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, time: Arc<dyn TimeSource>) -> Self {
        Self { store, time }
    }

    /// Launches a session: fixes the window and seed, writes the document,
    /// and returns the session with its assigned id.
    ///
    /// A failed store write does not fail the launch. The session comes back
    /// with a locally synthesized id and [`StartMode::DegradedLocal`] so the
    /// teacher client can warn that students will not be notified.
    pub fn start_session(&self, params: SessionParams) -> QuizResult<SessionStart> {
        if params.duration_secs == 0 {
            return Err(QuizError::InvalidRequest {
                info: "session duration must be positive".to_owned(),
            });
        }

        let start_time = self.time.now();
        let session_seed = params
            .session_seed
            .unwrap_or_else(|| generate_seed(start_time));
        let mut session = Session {
            id: SessionId::default(),
            quiz_id: params.quiz_id,
            quiz_title: params.quiz_title,
            class_id: params.class_id,
            class_name: params.class_name,
            teacher_id: params.teacher_id,
            teacher_name: params.teacher_name,
            start_time,
            end_time: start_time.saturating_add_millis(i64::from(params.duration_secs) * 1_000),
            duration_secs: params.duration_secs,
            session_seed,
            status: SessionStatus::Active,
            question_count: params.question_count,
            total_students: params.total_students,
            submitted_count: 0,
        };
        session.validate()?;

        let body = encode_doc(&session)?;
        match self.store.create(collections::SESSIONS, body) {
            Ok(id) => {
                session.id = SessionId::new(id);
                Ok(SessionStart {
                    session,
                    mode: StartMode::Stored,
                })
            }
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::Store,
                    "session create failed ({}); continuing in degraded local mode",
                    err
                );
                session.id = SessionId::new(format!("local-{}", session.session_seed));
                Ok(SessionStart {
                    session,
                    mode: StartMode::DegradedLocal,
                })
            }
        }
    }

    /// Fetches one session by id.
    pub fn get_session(&self, id: &SessionId) -> QuizResult<Session> {
        let docs = self
            .store
            .query(collections::SESSIONS, &[Filter::eq("id", id.as_str())])?;
        match docs.first() {
            Some(doc) => doc.decode(),
            None => Err(QuizError::SessionNotFound { id: id.clone() }),
        }
    }

    /// Ends a session before its scheduled end time.
    ///
    /// Writes `status = completed` and moves `end_time` to now, so late
    /// queries see a window consistent with the early cutoff. Ending an
    /// already-completed session is a no-op that returns it unchanged.
    pub fn end_session_early(&self, id: &SessionId) -> QuizResult<Session> {
        let session = self.get_session(id)?;
        if session.status.is_completed() {
            return Ok(session);
        }

        let now = self.time.now();
        self.store.update(
            collections::SESSIONS,
            id.as_str(),
            serde_json::json!({
                "status": SessionStatus::Completed,
                "end_time": now,
            }),
        )?;
        self.get_session(id)
    }

    /// Subscribes to changes of one session document, delivering each new
    /// decoded state to `callback`.
    ///
    /// Documents that fail to decode are reported via telemetry and skipped;
    /// one corrupt write must not kill the subscription.
    pub fn subscribe_to_status(
        &self,
        id: &SessionId,
        callback: impl Fn(Session) + Send + Sync + 'static,
    ) -> QuizResult<Subscription> {
        self.store.subscribe(
            collections::SESSIONS,
            &[Filter::eq("id", id.as_str())],
            Arc::new(move |doc| match doc.decode::<Session>() {
                Ok(session) => callback(session),
                Err(err) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::Store,
                        "undecodable session document {}: {}",
                        doc.id,
                        err
                    );
                }
            }),
        )
    }

    /// The service's time source, shared with countdowns and controllers.
    #[must_use]
    pub fn time_source(&self) -> Arc<dyn TimeSource> {
        self.time.clone()
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}
