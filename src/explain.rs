//! Post-attempt review with optional generated explanations.
//!
//! Explanations come from an external generator (typically an AI service)
//! behind the [`ExplanationGenerator`] trait. They are strictly cosmetic:
//! generated only from the second attempt onward and only for incorrect
//! answers, and a generator failure substitutes [`FALLBACK_EXPLANATION`]
//! without touching scoring or retake eligibility. Nothing here blocks or
//! retries.

use crate::model::{HistoricalAttemptRecord, Question};
use crate::QuizResult;

/// Shown in place of an explanation the generator failed to produce.
pub const FALLBACK_EXPLANATION: &str =
    "Explanation unavailable right now. Compare your answer with the correct one and try again.";

/// External producer of per-question answer explanations. May fail.
pub trait ExplanationGenerator: Send + Sync {
    /// Explains why `correct_answer` is right for `question_text`, given what
    /// the student chose (`None` when the question was left unanswered).
    fn generate(
        &self,
        question_text: &str,
        correct_answer: &str,
        chosen_answer: Option<&str>,
    ) -> QuizResult<String>;
}

/// One question of a reviewed attempt, resolved to display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionReview {
    /// The reviewed question's id.
    pub question_id: String,
    /// The question text.
    pub question_text: String,
    /// The correct option's text.
    pub correct_answer: String,
    /// What the student chose; `None` when unanswered.
    pub chosen_answer: Option<String>,
    /// Whether the student's answer was correct.
    pub correct: bool,
    /// Generated explanation, when one applies to this answer.
    pub explanation: Option<String>,
}

/// Builds the per-question review for one historical attempt.
///
/// Answers referencing questions missing from `questions` (the bank changed
/// under the record) are skipped with a warning. Explanations are requested
/// only when `attempt_number >= 2` and the answer was wrong; a failing
/// generator is logged and replaced by [`FALLBACK_EXPLANATION`].
#[must_use]
pub fn review_attempt(
    record: &HistoricalAttemptRecord,
    questions: &[Question],
    generator: Option<&dyn ExplanationGenerator>,
) -> Vec<QuestionReview> {
    let wants_explanations = record.attempt_number >= 2;
    let mut reviews = Vec::with_capacity(record.answers.len());

    for answer in &record.answers {
        let Some(question) = questions.iter().find(|q| q.id == answer.question_id) else {
            tracing::warn!(
                question_id = %answer.question_id,
                quiz_id = %record.quiz_id,
                "reviewed answer references a question no longer in the bank; skipping"
            );
            continue;
        };
        let Some(correct_answer) = question.options.get(question.correct_index).cloned() else {
            tracing::warn!(
                question_id = %question.id,
                "question has no option at its correct index; skipping review"
            );
            continue;
        };
        let chosen_answer = answer
            .chosen_canonical
            .and_then(|index| question.options.get(index).cloned());

        let explanation = if wants_explanations && !answer.correct {
            generator.map(|generator| {
                generator
                    .generate(&question.text, &correct_answer, chosen_answer.as_deref())
                    .unwrap_or_else(|err| {
                        tracing::warn!(
                            question_id = %question.id,
                            error = %err,
                            "explanation generation failed; using fallback text"
                        );
                        FALLBACK_EXPLANATION.to_owned()
                    })
            })
        } else {
            None
        };

        reviews.push(QuestionReview {
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            correct_answer,
            chosen_answer,
            correct: answer.correct,
            explanation,
        });
    }

    reviews
}
