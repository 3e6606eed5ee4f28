//! The student-side taking controller: shuffled view, answer collection,
//! and exactly-once submission.
//!
//! Submission can be forced by three independent triggers (the countdown's
//! `TimeUp`, a status push reporting the teacher ended the session, and the
//! host's redundant safety poll) plus the student's own submit button. Any
//! of them may fire first, and several may fire near-simultaneously (an early
//! end races the safety poll on every client). The controller funnels them
//! all through one compare-and-set on [`SubmissionState`], so exactly one
//! attempt is computed and written per controller instance. Cross-tab
//! idempotency is explicitly not guaranteed; a best-effort pre-write query
//! skips the duplicate write when another tab already submitted.
//!
//! A failed attempt write is not a failed submission: the graded attempt is
//! returned with [`SubmitMode::DegradedLocal`] so the host can still show the
//! student their result. Never a silent success, never a silent retry.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::clock::{spawn_countdown, Countdown, CountdownConfig, CountdownEvent, TimeSource};
use crate::explain::{review_attempt, ExplanationGenerator, QuestionReview};
use crate::history::HistoryService;
use crate::model::{collections, Attempt, Question, ReviewedAnswer, Session};
use crate::randomize::{student_view, StudentView};
use crate::store::adapter::{encode_doc, DocumentStore, Filter, Subscription};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, AttemptId, QuizError, QuizResult, StudentId, Timestamp};

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// The countdown delivered `TimeUp`.
    TimeUp,
    /// A status push reported the session completed (teacher ended early).
    SessionCompleted,
    /// The host's redundant deadline poll noticed the end time had passed.
    SafetyPoll,
    /// The student pressed submit.
    Manual,
}

/// How the submitted attempt is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// The attempt document was written to the store.
    Stored,
    /// The store write failed; the attempt exists only in this outcome.
    DegradedLocal,
    /// An attempt for this (session, student) already existed; no write.
    DuplicateSkipped,
}

/// The result of the one submission a controller performs.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// The graded attempt.
    pub attempt: Attempt,
    /// Whether it reached the store.
    pub mode: SubmitMode,
    /// What forced the submission.
    pub trigger: SubmitTrigger,
}

/// Lifecycle of the submission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Accepting answers; no trigger has fired yet.
    Idle,
    /// A trigger won the compare-and-set and is computing/writing.
    Submitting,
    /// The submission happened; all later triggers are no-ops.
    Submitted,
}

/// Builder for [`TakingController`].
pub struct TakingControllerBuilder {
    session: Session,
    student_id: StudentId,
    student_name: String,
    questions: Vec<Question>,
    store: Arc<dyn DocumentStore>,
    time: Arc<dyn TimeSource>,
    countdown: Option<CountdownConfig>,
    explainer: Option<Arc<dyn ExplanationGenerator>>,
}

impl TakingControllerBuilder {
    /// Starts a builder from the required collaborators.
    #[must_use]
    pub fn new(
        session: Session,
        student_id: StudentId,
        student_name: impl Into<String>,
        questions: Vec<Question>,
        store: Arc<dyn DocumentStore>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            session,
            student_id,
            student_name: student_name.into(),
            questions,
            store,
            time,
            countdown: Some(CountdownConfig::default()),
            explainer: None,
        }
    }

    /// Overrides the countdown configuration.
    #[must_use]
    pub fn countdown_config(mut self, config: CountdownConfig) -> Self {
        self.countdown = Some(config);
        self
    }

    /// Skips spawning a countdown. The host must then drive
    /// [`TakingController::check_deadline`] itself.
    #[must_use]
    pub fn without_countdown(mut self) -> Self {
        self.countdown = None;
        self
    }

    /// Attaches an explanation generator for post-attempt review.
    #[must_use]
    pub fn explanation_generator(mut self, generator: Arc<dyn ExplanationGenerator>) -> Self {
        self.explainer = Some(generator);
        self
    }

    /// Derives the student's shuffled view, spawns the countdown, subscribes
    /// to session status, and returns the ready controller.
    ///
    /// Fails with [`QuizError::SessionExpired`] when the session has already
    /// ended; a controller for a dead session would only ever submit an
    /// empty late attempt.
    pub fn build(self) -> QuizResult<Arc<TakingController>> {
        self.session.validate()?;
        let now = self.time.now();
        if self.session.status.is_completed() || self.session.has_expired(now) {
            return Err(QuizError::SessionExpired {
                id: self.session.id.clone(),
            });
        }

        let view = student_view(&self.questions, &self.session.session_seed, &self.student_id);
        let answer_count = view.questions.len();
        let history = HistoryService::new(self.store.clone());
        let session_id = self.session.id.clone();
        let end_time = self.session.end_time;
        let time = self.time.clone();
        let countdown_config = self.countdown;

        let controller = Arc::new_cyclic(|weak: &Weak<TakingController>| {
            let countdown = countdown_config.map(|config| {
                let weak = weak.clone();
                spawn_countdown(
                    config,
                    time.clone(),
                    end_time,
                    Box::new(move |event| {
                        if event == CountdownEvent::TimeUp {
                            if let Some(controller) = weak.upgrade() {
                                controller.trigger_submit(SubmitTrigger::TimeUp);
                            }
                        }
                    }),
                )
            });

            TakingController {
                session: Mutex::new(self.session),
                student_id: self.student_id,
                student_name: self.student_name,
                questions: self.questions,
                view,
                answers: Mutex::new(vec![None; answer_count]),
                state: Mutex::new(SubmissionState::Idle),
                outcome: Mutex::new(None),
                store: self.store,
                time,
                history,
                explainer: self.explainer,
                countdown: Mutex::new(countdown),
                status_sub: Mutex::new(None),
            }
        });

        let weak = Arc::downgrade(&controller);
        let sub = controller.store.subscribe(
            collections::SESSIONS,
            &[Filter::eq("id", session_id.as_str())],
            Arc::new(move |doc| {
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                match doc.decode::<Session>() {
                    Ok(session) => controller.handle_status(session),
                    Err(err) => {
                        report_violation!(
                            ViolationSeverity::Error,
                            ViolationKind::Store,
                            "undecodable session document {}: {}",
                            doc.id,
                            err
                        );
                    }
                }
            }),
        )?;
        *controller.status_sub.lock() = Some(sub);

        Ok(controller)
    }
}

impl std::fmt::Debug for TakingControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TakingControllerBuilder")
            .field("session", &self.session.id)
            .field("student", &self.student_id)
            .finish_non_exhaustive()
    }
}

/// One student's in-flight participation in one session.
///
/// Built via [`TakingControllerBuilder`]; always lives behind an `Arc` so the
/// countdown and subscription callbacks can reach it weakly without keeping
/// it alive after the host drops it.
pub struct TakingController {
    session: Mutex<Session>,
    student_id: StudentId,
    student_name: String,
    questions: Vec<Question>,
    view: StudentView,
    answers: Mutex<Vec<Option<usize>>>,
    state: Mutex<SubmissionState>,
    outcome: Mutex<Option<SubmitOutcome>>,
    store: Arc<dyn DocumentStore>,
    time: Arc<dyn TimeSource>,
    history: HistoryService,
    explainer: Option<Arc<dyn ExplanationGenerator>>,
    countdown: Mutex<Option<Box<dyn Countdown>>>,
    status_sub: Mutex<Option<Subscription>>,
}

impl TakingController {
    /// The student's shuffled view of the quiz.
    #[must_use]
    pub fn view(&self) -> &StudentView {
        &self.view
    }

    /// Current answers, indexed by visible question position.
    #[must_use]
    pub fn answers(&self) -> Vec<Option<usize>> {
        self.answers.lock().clone()
    }

    /// Milliseconds until the (possibly shortened) end time.
    #[must_use]
    pub fn remaining_ms(&self) -> i64 {
        self.session.lock().remaining_ms(self.time.now())
    }

    /// The latest known session state.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Where the submission guard currently stands.
    #[must_use]
    pub fn submission_state(&self) -> SubmissionState {
        *self.state.lock()
    }

    /// The submission outcome, once one exists.
    #[must_use]
    pub fn last_outcome(&self) -> Option<SubmitOutcome> {
        self.outcome.lock().clone()
    }

    /// Records the student's choice for one visible question.
    ///
    /// Both indices are in the student's shuffled space. Rejected once a
    /// submission has started.
    pub fn select_answer(&self, question_pos: usize, option_slot: usize) -> QuizResult<()> {
        if *self.state.lock() != SubmissionState::Idle {
            return Err(QuizError::InvalidRequest {
                info: "answers are closed; the attempt has been submitted".to_owned(),
            });
        }
        let Some(question) = self.view.questions.get(question_pos) else {
            return Err(QuizError::InvalidRequest {
                info: format!("no question at position {}", question_pos),
            });
        };
        if option_slot >= question.options.len() {
            return Err(QuizError::InvalidRequest {
                info: format!(
                    "question {} has {} options, got slot {}",
                    question.id,
                    question.options.len(),
                    option_slot
                ),
            });
        }
        if let Some(answer) = self.answers.lock().get_mut(question_pos) {
            *answer = Some(option_slot);
        }
        Ok(())
    }

    /// The host's redundant deadline check, called on a ~1 s cadence.
    ///
    /// Compares `now` against the known end time independently of the
    /// countdown, so a dead countdown thread cannot leave the attempt
    /// unsubmitted. Returns the outcome if this call performed the submission.
    pub fn check_deadline(&self) -> Option<SubmitOutcome> {
        let expired = {
            let session = self.session.lock();
            session.has_expired(self.time.now())
        };
        if expired {
            self.submit(SubmitTrigger::SafetyPoll)
        } else {
            None
        }
    }

    /// Submits the attempt now, if no other trigger beat this one to it.
    ///
    /// Returns `None` when a submission already happened (or is in flight);
    /// the earlier outcome is available from [`Self::last_outcome`].
    pub fn submit(&self, trigger: SubmitTrigger) -> Option<SubmitOutcome> {
        {
            let mut state = self.state.lock();
            if *state != SubmissionState::Idle {
                return None;
            }
            *state = SubmissionState::Submitting;
        }

        let outcome = self.perform_submission(trigger);
        *self.outcome.lock() = Some(outcome.clone());
        *self.state.lock() = SubmissionState::Submitted;
        self.shutdown();
        Some(outcome)
    }

    /// Reviews the student's latest recorded attempt at this quiz, with
    /// explanations when a generator is attached.
    pub fn review_last_attempt(&self) -> QuizResult<Vec<QuestionReview>> {
        let quiz_id = self.session.lock().quiz_id.clone();
        let Some(record) = self.history.latest_attempt(&self.student_id, &quiz_id)? else {
            return Ok(Vec::new());
        };
        Ok(review_attempt(
            &record,
            &self.questions,
            self.explainer.as_deref(),
        ))
    }

    /// Stops the countdown and drops the status subscription. Idempotent;
    /// also runs on drop. Leaking either would deliver duplicate events to a
    /// remounted controller.
    pub fn shutdown(&self) {
        if let Some(countdown) = self.countdown.lock().take() {
            countdown.stop();
        }
        drop(self.status_sub.lock().take());
    }

    fn trigger_submit(&self, trigger: SubmitTrigger) {
        let _ = self.submit(trigger);
    }

    /// Absorbs one pushed session state, ignoring status regressions, and
    /// submits when the session completed under us.
    fn handle_status(&self, incoming: Session) {
        let completed = {
            let mut session = self.session.lock();
            if !session.status.can_transition_to(incoming.status) {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::Store,
                    "session {} status regressed from {} to {}; ignoring",
                    session.id,
                    session.status,
                    incoming.status
                );
                return;
            }
            *session = incoming;
            session.status.is_completed()
        };
        if completed {
            self.trigger_submit(SubmitTrigger::SessionCompleted);
        }
    }

    /// Grades, writes, and reports one attempt. Only ever reached by the
    /// single trigger that won the guard.
    fn perform_submission(&self, trigger: SubmitTrigger) -> SubmitOutcome {
        let now = self.time.now();
        let session = self.session.lock().clone();
        let answers = self.answers.lock().clone();

        let score = self
            .view
            .questions
            .iter()
            .zip(&answers)
            .filter(|(question, answer)| **answer == Some(question.correct_index))
            .count() as u32;
        let time_taken_ms = now.saturating_since(session.start_time);

        let mut attempt = Attempt {
            id: AttemptId::default(),
            session_id: session.id.clone(),
            student_id: self.student_id.clone(),
            student_name: self.student_name.clone(),
            answers,
            score,
            time_taken_ms,
            submit_time: now,
            is_late: time_taken_ms > session.duration_ms(),
            question_order: self.view.question_order.clone(),
            option_orders: self
                .view
                .questions
                .iter()
                .map(|question| question.option_order.clone())
                .collect(),
        };

        if self.existing_attempt() {
            tracing::debug!(
                session = %session.id,
                student = %self.student_id,
                "attempt already recorded elsewhere; skipping duplicate write"
            );
            return SubmitOutcome {
                attempt,
                mode: SubmitMode::DuplicateSkipped,
                trigger,
            };
        }

        let mode = match encode_doc(&attempt)
            .and_then(|body| self.store.create(collections::ATTEMPTS, body))
        {
            Ok(id) => {
                attempt.id = AttemptId::new(id);
                self.bump_submitted_count(&session);
                self.append_history(&attempt, &session, now);
                SubmitMode::Stored
            }
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Error,
                    ViolationKind::Submission,
                    "attempt write for session {} failed ({}); returning locally cached result",
                    session.id,
                    err
                );
                SubmitMode::DegradedLocal
            }
        };

        SubmitOutcome {
            attempt,
            mode,
            trigger,
        }
    }

    /// Best-effort pre-write duplicate probe. A query failure counts as "no
    /// duplicate"; the write proceeds.
    fn existing_attempt(&self) -> bool {
        let session_id = self.session.lock().id.clone();
        match self.store.query(
            collections::ATTEMPTS,
            &[
                Filter::eq("session_id", session_id.as_str()),
                Filter::eq("student_id", self.student_id.as_str()),
            ],
        ) {
            Ok(docs) => !docs.is_empty(),
            Err(err) => {
                tracing::debug!(error = %err, "duplicate probe failed; proceeding with write");
                false
            }
        }
    }

    /// Lossy display counter: read-then-write with no transaction. Losses
    /// under concurrency are accepted; the attempt collection is the
    /// authoritative record.
    fn bump_submitted_count(&self, session: &Session) {
        let result = self
            .store
            .query(
                collections::SESSIONS,
                &[Filter::eq("id", session.id.as_str())],
            )
            .and_then(|docs| match docs.first() {
                Some(doc) => doc.decode::<Session>(),
                None => Err(QuizError::SessionNotFound {
                    id: session.id.clone(),
                }),
            })
            .and_then(|current| {
                self.store.update(
                    collections::SESSIONS,
                    session.id.as_str(),
                    serde_json::json!({"submitted_count": current.submitted_count + 1}),
                )
            });
        if let Err(err) = result {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Store,
                "submitted_count increment for session {} lost: {}",
                session.id,
                err
            );
        }
    }

    /// Appends the cross-session history record. Failures are logged, never
    /// fatal: the attempt itself is already safe.
    fn append_history(&self, attempt: &Attempt, session: &Session, now: Timestamp) {
        let attempt_number = match self.history.attempt_count(&self.student_id, &session.quiz_id)
        {
            Ok(count) => count + 1,
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::Store,
                    "attempt count lookup failed ({}); skipping history append",
                    err
                );
                return;
            }
        };

        let answers = self
            .view
            .questions
            .iter()
            .zip(&attempt.answers)
            .map(|(question, answer)| ReviewedAnswer {
                question_id: question.id.clone(),
                chosen_canonical: answer
                    .and_then(|slot| question.option_order.get(slot).copied()),
                correct: *answer == Some(question.correct_index),
            })
            .collect();

        let record = crate::model::HistoricalAttemptRecord {
            student_id: self.student_id.clone(),
            quiz_id: session.quiz_id.clone(),
            session_id: Some(session.id.clone()),
            attempt_number,
            answers,
            score: attempt.score,
            total_questions: self.view.questions.len() as u32,
            completed_at: now,
        };
        if let Err(err) = self.history.save_attempt(&record) {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Store,
                "history append for session {} failed: {}",
                session.id,
                err
            );
        }
    }
}

impl Drop for TakingController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TakingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TakingController")
            .field("student", &self.student_id)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::session::{SessionParams, SessionService};
    use crate::store::flaky::FlakyStore;
    use crate::store::memory::MemoryStore;
    use crate::{ClassId, QuizId};

    fn questions() -> Vec<Question> {
        (0..5)
            .map(|i| Question {
                id: format!("q{}", i),
                text: format!("Question {}", i),
                options: (0..4).map(|o| format!("q{}-opt{}", i, o)).collect(),
                correct_index: i % 4,
            })
            .collect()
    }

    struct Env {
        store: Arc<dyn DocumentStore>,
        clock: ManualTimeSource,
        session: Session,
    }

    fn env_with_store(store: Arc<dyn DocumentStore>, start_ms: i64) -> Env {
        let clock = ManualTimeSource::starting_at(Timestamp::from_millis(start_ms));
        let service = SessionService::new(store.clone(), Arc::new(clock.clone()));
        let started = service
            .start_session(SessionParams {
                quiz_id: QuizId::new("quiz-7"),
                quiz_title: "Fractions".to_owned(),
                class_id: ClassId::new("8-A"),
                class_name: "8-A".to_owned(),
                teacher_id: "t1".to_owned(),
                teacher_name: "Ms. Kim".to_owned(),
                duration_secs: 120,
                question_count: 5,
                total_students: 25,
                session_seed: Some("sess-42".to_owned()),
            })
            .unwrap();
        Env {
            store,
            clock,
            session: started.session,
        }
    }

    fn env(start_ms: i64) -> Env {
        env_with_store(Arc::new(MemoryStore::new()), start_ms)
    }

    fn controller(env: &Env, student: &str) -> Arc<TakingController> {
        TakingControllerBuilder::new(
            env.session.clone(),
            StudentId::new(student),
            student,
            questions(),
            env.store.clone(),
            Arc::new(env.clock.clone()),
        )
        .without_countdown()
        .build()
        .unwrap()
    }

    #[test]
    fn view_is_deterministic_per_student() {
        let env = env(10_000);
        let a = controller(&env, "alice");
        let b = controller(&env, "alice");
        assert_eq!(a.view(), b.view());

        let c = controller(&env, "bob");
        assert_ne!(a.view().question_order, c.view().question_order);
    }

    #[test]
    fn expired_session_cannot_be_joined() {
        let env = env(10_000);
        env.clock.set(Timestamp::from_millis(200_000));
        let err = TakingControllerBuilder::new(
            env.session.clone(),
            StudentId::new("late"),
            "late",
            questions(),
            env.store.clone(),
            Arc::new(env.clock.clone()),
        )
        .without_countdown()
        .build()
        .unwrap_err();
        assert!(matches!(err, QuizError::SessionExpired { .. }));
    }

    #[test]
    fn manual_submit_grades_and_stores() {
        let env = env(10_000);
        let controller = controller(&env, "alice");

        // Answer every question correctly in the shuffled space.
        for (pos, question) in controller.view().questions.iter().enumerate() {
            controller.select_answer(pos, question.correct_index).unwrap();
        }

        env.clock.set(Timestamp::from_millis(53_000));
        let outcome = controller.submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(outcome.mode, SubmitMode::Stored);
        assert_eq!(outcome.trigger, SubmitTrigger::Manual);
        assert_eq!(outcome.attempt.score, 5);
        assert_eq!(outcome.attempt.time_taken_ms, 43_000);
        assert!(!outcome.attempt.is_late);
        assert!(!outcome.attempt.id.as_str().is_empty());
        assert_eq!(outcome.attempt.question_order, controller.view().question_order);

        // Attempt document, counter, and history record all landed.
        let attempts = env
            .store
            .query(collections::ATTEMPTS, &[])
            .unwrap();
        assert_eq!(attempts.len(), 1);
        let session: Session = env
            .store
            .query(collections::SESSIONS, &[Filter::eq("id", env.session.id.as_str())])
            .unwrap()[0]
            .decode()
            .unwrap();
        assert_eq!(session.submitted_count, 1);
        let history = HistoryService::new(env.store.clone());
        assert_eq!(
            history
                .attempt_count(&StudentId::new("alice"), &QuizId::new("quiz-7"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn submission_happens_exactly_once() {
        let env = env(10_000);
        let controller = controller(&env, "alice");

        assert!(controller.submit(SubmitTrigger::Manual).is_some());
        assert!(controller.submit(SubmitTrigger::Manual).is_none());
        assert!(controller.check_deadline().is_none());
        assert_eq!(controller.submission_state(), SubmissionState::Submitted);
        assert_eq!(env.store.query(collections::ATTEMPTS, &[]).unwrap().len(), 1);
    }

    #[test]
    fn safety_poll_submits_after_expiry() {
        let env = env(10_000);
        let controller = controller(&env, "alice");
        controller.select_answer(0, controller.view().questions[0].correct_index).unwrap();

        // Before the deadline the poll is a no-op.
        env.clock.set(Timestamp::from_millis(129_000));
        assert!(controller.check_deadline().is_none());

        env.clock.set(Timestamp::from_millis(130_001));
        let outcome = controller.check_deadline().unwrap();
        assert_eq!(outcome.trigger, SubmitTrigger::SafetyPoll);
        assert_eq!(outcome.attempt.score, 1);
        // 120 001 ms elapsed against a 120 000 ms duration.
        assert!(outcome.attempt.is_late);
    }

    #[test]
    fn early_end_pushes_a_submission() {
        let env = env(10_000);
        let controller = controller(&env, "alice");
        let service =
            SessionService::new(env.store.clone(), Arc::new(env.clock.clone()));

        env.clock.set(Timestamp::from_millis(60_000));
        service.end_session_early(&env.session.id).unwrap();

        let outcome = controller.last_outcome().unwrap();
        assert_eq!(outcome.trigger, SubmitTrigger::SessionCompleted);
        assert!(!outcome.attempt.is_late);
        // Answers are closed afterwards.
        assert!(matches!(
            controller.select_answer(0, 0),
            Err(QuizError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn failed_write_degrades_to_local_result() {
        let memory = Arc::new(MemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(memory.clone()));
        let env = env_with_store(flaky.clone(), 10_000);
        let controller = controller(&env, "alice");

        flaky.fail_creates(1);
        let outcome = controller.submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(outcome.mode, SubmitMode::DegradedLocal);
        // The graded attempt is still fully populated for the results view.
        assert_eq!(outcome.attempt.answers.len(), 5);
        assert!(memory.is_empty(collections::ATTEMPTS));
        // No counter bump and no history record without a stored attempt.
        assert!(memory.is_empty(collections::HISTORY));
    }

    #[test]
    fn preexisting_attempt_skips_the_write() {
        let env = env(10_000);
        let first = controller(&env, "alice");
        first.submit(SubmitTrigger::Manual).unwrap();

        // A second controller for the same student (another tab).
        let second = controller(&env, "alice");
        let outcome = second.submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(outcome.mode, SubmitMode::DuplicateSkipped);
        assert_eq!(env.store.query(collections::ATTEMPTS, &[]).unwrap().len(), 1);
    }

    #[test]
    fn answer_indices_are_validated() {
        let env = env(10_000);
        let controller = controller(&env, "alice");
        assert!(controller.select_answer(99, 0).is_err());
        assert!(controller.select_answer(0, 99).is_err());
        assert!(controller.select_answer(0, 3).is_ok());
        assert_eq!(controller.answers()[0], Some(3));
    }

    #[test]
    fn unanswered_questions_score_zero() {
        let env = env(10_000);
        let controller = controller(&env, "alice");
        let outcome = controller.submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(outcome.attempt.score, 0);
        assert!(outcome.attempt.answers.iter().all(Option::is_none));
    }

    #[test]
    fn history_record_maps_answers_to_canonical_space() {
        let env = env(10_000);
        let controller = controller(&env, "alice");
        // Answer the first visible question correctly.
        let question = &controller.view().questions[0];
        controller.select_answer(0, question.correct_index).unwrap();
        controller.submit(SubmitTrigger::Manual).unwrap();

        let history = HistoryService::new(env.store.clone());
        let record = history
            .latest_attempt(&StudentId::new("alice"), &QuizId::new("quiz-7"))
            .unwrap()
            .unwrap();
        assert_eq!(record.attempt_number, 1);
        assert_eq!(record.total_questions, 5);
        let reviewed = record
            .answers
            .iter()
            .find(|answer| answer.question_id == question.id)
            .unwrap();
        assert!(reviewed.correct);
        // The canonical index points at the canonical correct option.
        let canonical = questions()
            .into_iter()
            .find(|q| q.id == question.id)
            .unwrap();
        assert_eq!(reviewed.chosen_canonical, Some(canonical.correct_index));
    }

    #[test]
    fn review_uses_attached_generator() {
        struct Echo;
        impl ExplanationGenerator for Echo {
            fn generate(&self, _: &str, correct: &str, _: Option<&str>) -> QuizResult<String> {
                Ok(format!("because {}", correct))
            }
        }

        let env = env(10_000);
        // First attempt, all questions unanswered and wrong.
        controller(&env, "alice").submit(SubmitTrigger::Manual).unwrap();

        // Second attempt via a fresh controller with a generator attached.
        let second = TakingControllerBuilder::new(
            env.session.clone(),
            StudentId::new("alice"),
            "alice",
            questions(),
            env.store.clone(),
            Arc::new(env.clock.clone()),
        )
        .without_countdown()
        .explanation_generator(Arc::new(Echo))
        .build()
        .unwrap();
        // The duplicate probe keeps the attempt write out, so append the
        // second history record directly, as a non-live retake would.
        let history = HistoryService::new(env.store.clone());
        let mut record = history
            .latest_attempt(&StudentId::new("alice"), &QuizId::new("quiz-7"))
            .unwrap()
            .unwrap();
        record.attempt_number = 2;
        history.save_attempt(&record).unwrap();

        let reviews = second.review_last_attempt().unwrap();
        assert_eq!(reviews.len(), 5);
        // Attempt two, every answer wrong: every review carries an explanation.
        assert!(reviews
            .iter()
            .all(|r| r.explanation.as_deref().map_or(false, |e| e.starts_with("because"))));
    }
}
