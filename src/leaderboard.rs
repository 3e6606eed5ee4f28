//! Pure ranking over one session's attempts.
//!
//! Ordering: score descending, ties broken by earlier submission, residual
//! ties by attempt id. The third key makes the order total, so the result is
//! independent of the order the store returned the attempts in.

use crate::model::{collections, Attempt};
use crate::store::adapter::{DocumentStore, Filter};
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, QuizResult, SessionId, StudentId, Timestamp};

/// One ranked row of a session leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// 1-based position after sorting.
    pub rank: u32,
    /// The submitting student.
    pub student_id: StudentId,
    /// Student display name.
    pub student_name: String,
    /// Number of correct answers.
    pub score: u32,
    /// When the attempt was submitted.
    pub submit_time: Timestamp,
    /// Submission time minus session start.
    pub time_taken_ms: i64,
    /// Whether the attempt came in past the nominal duration.
    pub is_late: bool,
}

/// Ranks a session's attempts into leaderboard order.
#[must_use]
pub fn rank_attempts(mut attempts: Vec<Attempt>) -> Vec<LeaderboardEntry> {
    attempts.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.submit_time.cmp(&b.submit_time))
            .then_with(|| a.id.cmp(&b.id))
    });
    attempts
        .into_iter()
        .enumerate()
        .map(|(index, attempt)| LeaderboardEntry {
            rank: index as u32 + 1,
            student_id: attempt.student_id,
            student_name: attempt.student_name,
            score: attempt.score,
            submit_time: attempt.submit_time,
            time_taken_ms: attempt.time_taken_ms,
            is_late: attempt.is_late,
        })
        .collect()
}

/// Queries and ranks all attempts of one session.
///
/// Undecodable attempt documents are reported and skipped rather than hiding
/// the whole board.
pub fn quiz_leaderboard(
    store: &dyn DocumentStore,
    session_id: &SessionId,
) -> QuizResult<Vec<LeaderboardEntry>> {
    let docs = store.query(
        collections::ATTEMPTS,
        &[Filter::eq("session_id", session_id.as_str())],
    )?;
    let attempts = docs
        .iter()
        .filter_map(|doc| match doc.decode::<Attempt>() {
            Ok(attempt) => Some(attempt),
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Error,
                    ViolationKind::Store,
                    "undecodable attempt document {}: {}",
                    doc.id,
                    err
                );
                None
            }
        })
        .collect();
    Ok(rank_attempts(attempts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::AttemptId;

    fn attempt(id: &str, student: &str, score: u32, submit_ms: i64) -> Attempt {
        Attempt {
            id: AttemptId::new(id),
            session_id: SessionId::new("s1"),
            student_id: StudentId::new(student),
            student_name: student.to_owned(),
            answers: vec![],
            score,
            time_taken_ms: submit_ms,
            submit_time: Timestamp::from_millis(submit_ms),
            is_late: false,
            question_order: vec![],
            option_orders: vec![],
        }
    }

    #[test]
    fn higher_score_ranks_first() {
        let board = rank_attempts(vec![
            attempt("a1", "alice", 7, 50_000),
            attempt("a2", "bob", 9, 60_000),
        ]);
        assert_eq!(board[0].student_name, "bob");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn score_ties_break_by_earlier_submission() {
        let board = rank_attempts(vec![
            attempt("a1", "alice", 8, 95_000),
            attempt("a2", "bob", 8, 70_000),
        ]);
        assert_eq!(board[0].student_name, "bob");
        assert_eq!(board[1].student_name, "alice");
    }

    #[test]
    fn ordering_is_input_order_independent() {
        let forward = rank_attempts(vec![
            attempt("a1", "alice", 8, 50_000),
            attempt("a2", "bob", 8, 50_000),
            attempt("a3", "carol", 5, 40_000),
        ]);
        let reversed = rank_attempts(vec![
            attempt("a3", "carol", 5, 40_000),
            attempt("a2", "bob", 8, 50_000),
            attempt("a1", "alice", 8, 50_000),
        ]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn empty_input_gives_empty_board() {
        assert!(rank_attempts(vec![]).is_empty());
    }

    #[test]
    fn board_queries_only_the_requested_session() {
        use crate::store::adapter::encode_doc;
        use crate::store::memory::MemoryStore;

        let store = MemoryStore::new();
        store
            .create(collections::ATTEMPTS, encode_doc(&attempt("a1", "alice", 3, 1_000)).unwrap())
            .unwrap();
        let mut other = attempt("a2", "bob", 9, 1_000);
        other.session_id = SessionId::new("s2");
        store
            .create(collections::ATTEMPTS, encode_doc(&other).unwrap())
            .unwrap();

        let board = quiz_leaderboard(&store, &SessionId::new("s1")).unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].student_name, "alice");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod property_tests {
    use super::*;
    use crate::AttemptId;
    use proptest::prelude::*;

    fn arb_attempts() -> impl Strategy<Value = Vec<Attempt>> {
        proptest::collection::vec((0u32..20, 0i64..200_000), 0..32).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(index, (score, submit_ms))| Attempt {
                    id: AttemptId::new(format!("a{}", index)),
                    session_id: SessionId::new("s1"),
                    student_id: StudentId::new(format!("stu{}", index)),
                    student_name: format!("stu{}", index),
                    answers: vec![],
                    score,
                    time_taken_ms: submit_ms,
                    submit_time: Timestamp::from_millis(submit_ms),
                    is_late: false,
                    question_order: vec![],
                    option_orders: vec![],
                })
                .collect()
        })
    }

    proptest! {
        /// Property: ranks are exactly 1..=n and the sort keys are monotone.
        #[test]
        fn prop_board_is_totally_ordered(attempts in arb_attempts()) {
            let board = rank_attempts(attempts.clone());
            prop_assert_eq!(board.len(), attempts.len());
            for (index, entry) in board.iter().enumerate() {
                prop_assert_eq!(entry.rank as usize, index + 1);
            }
            for pair in board.windows(2) {
                let better = &pair[0];
                let worse = &pair[1];
                prop_assert!(
                    better.score > worse.score
                        || (better.score == worse.score
                            && better.submit_time <= worse.submit_time)
                );
            }
        }

        /// Property: shuffling the input never changes the output.
        #[test]
        fn prop_input_order_is_irrelevant(attempts in arb_attempts()) {
            let mut reversed = attempts.clone();
            reversed.reverse();
            prop_assert_eq!(rank_attempts(attempts), rank_attempts(reversed));
        }
    }
}
