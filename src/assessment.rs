use thiserror::Error;

use crate::api::dto::{Answer, AssessmentQuestion, AssessmentSubmission, Id};

/// Five-point agreement scale; the option index plus one is the score.
pub const RATING_LABELS: [&str; 5] = [
    "Strongly Disagree",
    "Disagree",
    "Neutral",
    "Agree",
    "Strongly Agree",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssessmentError {
    #[error("question {index} does not exist (questionnaire has {len})")]
    UnknownQuestion { index: usize, len: usize },
    #[error("rating option {0} is outside the scale")]
    UnknownOption(usize),
    #[error("{0} question(s) still unanswered")]
    Incomplete(usize),
    #[error("questionnaire has no questions")]
    Empty,
}

/// Ratings collected for one company's questionnaire.
#[derive(Debug, Clone)]
pub struct AnswerSheet {
    questions: Vec<AssessmentQuestion>,
    selected: Vec<Option<usize>>,
}

impl AnswerSheet {
    pub fn new(questions: Vec<AssessmentQuestion>) -> Self {
        let selected = vec![None; questions.len()];
        Self {
            questions,
            selected,
        }
    }

    pub fn questions(&self) -> &[AssessmentQuestion] {
        &self.questions
    }

    /// Records (or overwrites) the chosen option for a question.
    pub fn select(&mut self, question: usize, option: usize) -> Result<(), AssessmentError> {
        let len = self.questions.len();
        let slot = self
            .selected
            .get_mut(question)
            .ok_or(AssessmentError::UnknownQuestion { index: question, len })?;
        if option >= RATING_LABELS.len() {
            return Err(AssessmentError::UnknownOption(option));
        }
        *slot = Some(option);
        Ok(())
    }

    pub fn selection(&self, question: usize) -> Option<usize> {
        self.selected.get(question).copied().flatten()
    }

    pub fn unanswered(&self) -> usize {
        self.selected.iter().filter(|s| s.is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.questions.is_empty() && self.unanswered() == 0
    }

    /// Builds the payload for the submit endpoint. Refuses partial sheets.
    pub fn submission(&self, company: Id) -> Result<AssessmentSubmission, AssessmentError> {
        if self.questions.is_empty() {
            return Err(AssessmentError::Empty);
        }
        let missing = self.unanswered();
        if missing > 0 {
            return Err(AssessmentError::Incomplete(missing));
        }
        let answers = self
            .questions
            .iter()
            .zip(&self.selected)
            .filter_map(|(q, s)| {
                s.map(|option| Answer {
                    question_id: q.id.clone(),
                    score: option as u8 + 1,
                })
            })
            .collect();
        Ok(AssessmentSubmission { company, answers })
    }
}
