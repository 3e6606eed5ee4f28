//! Join-time heuristic for students discovering a live session.
//!
//! When an active session event arrives, the client must choose between
//! pulling the student straight into the quiz and merely offering a way in.
//! The rule: a session that *just* started (within [`DiscoveryConfig`]'s
//! window) auto-navigates a student sitting on the landing page, because the
//! whole class is being pulled in together; anything older, or any student
//! mid-task elsewhere, gets a dismissible banner instead. Each session is
//! handled at most once, so re-delivered store events are idempotent.
//!
//! [`JoinDecider`] is pure and synchronous; [`listen_for_active_quiz`] wires
//! it to the store's push subscription.

use std::sync::Arc;

use crate::model::{collections, Session};
use crate::store::adapter::{DocumentStore, Filter, Subscription};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, ClassId, QuizResult, SessionId, SessionStatus, Timestamp};

/// Tuning for the join decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// How recently a session must have started to count as "just started"
    /// and trigger auto-navigation. Default: 5000 ms.
    pub just_started_window_ms: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            just_started_window_ms: 5_000,
        }
    }
}

/// What the client should do in response to one session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinAction {
    /// Nothing to do; the event was already handled.
    Ignore,
    /// Pull the student into the quiz now.
    Navigate,
    /// Offer a join banner with the remaining time.
    ShowBanner {
        /// Whole seconds until the session ends.
        remaining_secs: i64,
    },
    /// The session is over (or expired); remove any banner for it.
    ClearBanner,
}

/// Per-client join decision state.
///
/// Holds which session was last seen and which was last handled (navigated to
/// or explicitly joined), so repeated events for the same session collapse to
/// [`JoinAction::Ignore`].
#[derive(Debug, Clone, Default)]
pub struct JoinDecider {
    config: DiscoveryConfig,
    last_handled: Option<SessionId>,
    last_seen: Option<SessionId>,
}

impl JoinDecider {
    /// Creates a decider with the given configuration.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            last_handled: None,
            last_seen: None,
        }
    }

    /// Decides what to do about one incoming session event.
    ///
    /// `on_landing_page` is whether the student currently sits somewhere it
    /// is safe to yank them away from.
    pub fn decide(&mut self, session: &Session, now: Timestamp, on_landing_page: bool) -> JoinAction {
        // An ended or expired session is not joinable no matter how it looks.
        if session.status.is_completed() || session.has_expired(now) {
            return JoinAction::ClearBanner;
        }

        let already_handled = self.last_handled.as_ref() == Some(&session.id);
        if already_handled {
            return JoinAction::Ignore;
        }

        let is_new = self.last_seen.as_ref() != Some(&session.id);
        let just_started =
            session.time_since_start_ms(now) < self.config.just_started_window_ms;

        if is_new && just_started && on_landing_page {
            self.mark_joined(&session.id);
            return JoinAction::Navigate;
        }

        self.last_seen = Some(session.id.clone());
        JoinAction::ShowBanner {
            remaining_secs: session.remaining_ms(now) / 1_000,
        }
    }

    /// Records that the student joined `id` (via navigation or the banner's
    /// join button). Later events for the same session are ignored.
    pub fn mark_joined(&mut self, id: &SessionId) {
        self.last_handled = Some(id.clone());
        self.last_seen = Some(id.clone());
    }
}

/// Subscribes to active sessions for one class, feeding each decoded session
/// to `callback`.
///
/// The callback typically owns a [`JoinDecider`] and a clock and turns each
/// event into a [`JoinAction`]. Reconnection of a dropped remote subscription
/// is the store implementation's responsibility.
pub fn listen_for_active_quiz(
    store: &dyn DocumentStore,
    class_id: &ClassId,
    callback: impl Fn(Session) + Send + Sync + 'static,
) -> QuizResult<Subscription> {
    store.subscribe(
        collections::SESSIONS,
        &[
            Filter::eq("class_id", class_id.as_str()),
            Filter::eq("status", SessionStatus::Active.to_string()),
        ],
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
