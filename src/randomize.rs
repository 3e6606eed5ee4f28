//! Per-student randomization of questions and options.
//!
//! Every student sees the same quiz in a different order, yet the teacher and
//! all clients must still agree on "canonical question 3". This module derives
//! each student's view deterministically from the session seed and the student
//! id using the frozen generator in [`crate::rng`], and carries the canonical
//! (pre-shuffle) position of every question and option alongside the shuffled
//! data so identity survives the reordering.
//!
//! Seed derivation is part of the wire contract and must not change:
//!
//! - questions: `"{session_seed}-{student_id}-questions"`
//! - options:   `"{session_seed}-{student_id}-q{question_id}-options"`

use crate::model::{OptionOrder, Question};
use crate::rng::permutation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, StudentId};

/// A question paired with its canonical (pre-shuffle) position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedQuestion {
    /// Position of the question in the teacher's canonical order.
    pub canonical_index: usize,
    /// The question itself, options still in canonical order.
    pub question: Question,
}

/// The result of shuffling one question's options for one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizedOptions {
    /// Options in the student's shuffled order.
    pub options: Vec<String>,
    /// Index of the correct option in the shuffled order.
    pub correct_index: usize,
    /// Maps shuffled slot to canonical option index.
    pub order: OptionOrder,
}

/// One question as a specific student sees it: shuffled position, shuffled
/// options, and the permutations linking both back to canonical identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentQuestion {
    /// Position of this question in the canonical order.
    pub canonical_index: usize,
    /// Stable question id from the question bank.
    pub id: String,
    /// The question text.
    pub text: String,
    /// Options in this student's shuffled order.
    pub options: Vec<String>,
    /// Index of the correct option in this student's shuffled order.
    pub correct_index: usize,
    /// Maps this student's option slot to the canonical option index.
    pub option_order: OptionOrder,
}

/// A student's complete randomized view of a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentView {
    /// Questions in the student's display order.
    pub questions: Vec<StudentQuestion>,
    /// Maps student-visible question position to canonical position.
    pub question_order: Vec<usize>,
}

/// Derives the question-shuffle seed for one student.
#[must_use]
pub fn question_seed(session_seed: &str, student_id: &StudentId) -> String {
    format!("{}-{}-questions", session_seed, student_id)
}

/// Derives the option-shuffle seed for one student and question.
#[must_use]
pub fn option_seed(session_seed: &str, student_id: &StudentId, question_id: &str) -> String {
    format!("{}-{}-q{}-options", session_seed, student_id, question_id)
}

/// Shuffles `questions` into the order `student_id` sees them, carrying each
/// question's canonical position. Zero or one question is the identity.
#[must_use]
pub fn randomize_questions(
    questions: &[Question],
    session_seed: &str,
    student_id: &StudentId,
) -> Vec<OrderedQuestion> {
    let seed = question_seed(session_seed, student_id);
    let order = permutation(&seed, questions.len());
    order
        .into_iter()
        .filter_map(|canonical_index| {
            questions.get(canonical_index).map(|question| OrderedQuestion {
                canonical_index,
                question: question.clone(),
            })
        })
        .collect()
}

/// Shuffles one question's options for one student.
///
/// Returns the shuffled options, the new index of the correct option, and the
/// full slot-to-canonical permutation. A `correct_index` outside the option
/// list is reported via telemetry and clamped to the last option rather than
/// panicking; grading then proceeds against the clamped index.
#[must_use]
pub fn randomize_options(
    options: &[String],
    correct_index: usize,
    session_seed: &str,
    student_id: &StudentId,
    question_id: &str,
) -> RandomizedOptions {
    let correct_index = if correct_index >= options.len() && !options.is_empty() {
        report_violation!(
            ViolationSeverity::Error,
            ViolationKind::Configuration,
            "question {} declares correct index {} but has only {} options; clamping",
            question_id,
            correct_index,
            options.len()
        );
        options.len() - 1
    } else {
        correct_index
    };

    let seed = option_seed(session_seed, student_id, question_id);
    let order: OptionOrder = permutation(&seed, options.len()).into_iter().collect();

    let shuffled: Vec<String> = order
        .iter()
        .filter_map(|&canonical| options.get(canonical).cloned())
        .collect();
    let new_correct = order
        .iter()
        .position(|&canonical| canonical == correct_index)
        .unwrap_or(0);

    RandomizedOptions {
        options: shuffled,
        correct_index: new_correct,
        order,
    }
}

/// Builds a student's full randomized view: shuffled questions, each with
/// shuffled options, plus the permutations submission records need.
#[must_use]
pub fn student_view(
    questions: &[Question],
    session_seed: &str,
    student_id: &StudentId,
) -> StudentView {
    let mut view_questions = Vec::with_capacity(questions.len());
    let mut question_order = Vec::with_capacity(questions.len());

    for ordered in randomize_questions(questions, session_seed, student_id) {
        let randomized = randomize_options(
            &ordered.question.options,
            ordered.question.correct_index,
            session_seed,
            student_id,
            &ordered.question.id,
        );
        question_order.push(ordered.canonical_index);
        view_questions.push(StudentQuestion {
            canonical_index: ordered.canonical_index,
            id: ordered.question.id,
            text: ordered.question.text,
            options: randomized.options,
            correct_index: randomized.correct_index,
            option_order: randomized.order,
        });
    }

    StudentView {
        questions: view_questions,
        question_order,
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: for every seed/student/question, the shuffled correct
        /// option is the same string as the canonical correct option.
        #[test]
        fn prop_correctness_preserved(
            seed in "[a-z0-9-]{1,24}",
            student in "[a-z0-9]{1,12}",
            qid in "[a-z0-9]{1,8}",
            options in proptest::collection::vec("[a-z]{1,8}", 1..12),
            correct_raw in 0usize..12,
        ) {
            let correct = correct_raw % options.len();
            let student = StudentId::new(student);
            let randomized = randomize_options(&options, correct, &seed, &student, &qid);
            prop_assert_eq!(&randomized.options[randomized.correct_index], &options[correct]);
        }

        /// Property: the question permutation visits every canonical index once.
        #[test]
        fn prop_question_order_is_bijection(
            seed in "[a-z0-9-]{1,24}",
            student in "[a-z0-9]{1,12}",
            count in 0usize..24,
        ) {
            let questions: Vec<Question> = (0..count)
                .map(|i| Question {
                    id: format!("q{}", i),
                    text: String::new(),
                    options: vec!["x".to_owned(), "y".to_owned()],
                    correct_index: 0,
                })
                .collect();
            let student = StudentId::new(student);
            let ordered = randomize_questions(&questions, &seed, &student);
            let mut seen = vec![false; count];
            for q in &ordered {
                prop_assert!(!seen[q.canonical_index]);
                seen[q.canonical_index] = true;
            }
            prop_assert!(seen.iter().all(|&s| s));
        }
    }
}
