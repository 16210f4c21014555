//! Editable, ordered question list with a selection cursor.

use adapt_shared::{AdaptError, Question, QuestionType, Result};

/// The question list a curator edits before saving.
///
/// List order is the presentation and persistence order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionEditor {
    questions: Vec<Question>,
    selected: Option<usize>,
}

impl QuestionEditor {
    /// Load a freshly generated list. Selection starts on the first question.
    pub fn new(questions: Vec<Question>) -> Self {
        let selected = (!questions.is_empty()).then_some(0);
        Self {
            questions,
            selected,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Move the cursor. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.questions.len() {
            self.selected = Some(index);
        }
    }

    pub fn quiz_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_quiz()).count()
    }

    pub fn open_count(&self) -> usize {
        self.questions.len() - self.quiz_count()
    }

    /// Replace the question at `index`.
    pub fn update(&mut self, index: usize, question: Question) -> Result<()> {
        let len = self.questions.len();
        let slot = self
            .questions
            .get_mut(index)
            .ok_or(AdaptError::IndexOutOfRange { index, len })?;
        *slot = question;
        Ok(())
    }

    /// Delete the question at `index` and return it.
    ///
    /// The selection clamps to the nearest remaining question, or clears
    /// when the list becomes empty.
    pub fn remove(&mut self, index: usize) -> Result<Question> {
        let len = self.questions.len();
        if index >= len {
            return Err(AdaptError::IndexOutOfRange { index, len });
        }
        let removed = self.questions.remove(index);

        self.selected = match self.selected {
            _ if self.questions.is_empty() => None,
            Some(s) if s > index => Some(s - 1),
            Some(s) => Some(s.min(self.questions.len() - 1)),
            None => None,
        };
        Ok(removed)
    }

    /// Swap with the previous question. No-op at the top or out of range.
    pub fn move_up(&mut self, index: usize) {
        if index == 0 || index >= self.questions.len() {
            return;
        }
        self.swap(index, index - 1);
    }

    /// Swap with the next question. No-op at the bottom or out of range.
    pub fn move_down(&mut self, index: usize) {
        if index + 1 >= self.questions.len() {
            return;
        }
        self.swap(index, index + 1);
    }

    /// Append a blank question and select it. Returns its index.
    pub fn add(&mut self, question_type: QuestionType) -> usize {
        self.questions.push(Question::blank(question_type));
        let index = self.questions.len() - 1;
        self.selected = Some(index);
        index
    }

    fn swap(&mut self, from: usize, to: usize) {
        self.questions.swap(from, to);
        // Selection follows the moved question.
        self.selected = match self.selected {
            Some(s) if s == from => Some(to),
            Some(s) if s == to => Some(from),
            other => other,
        };
    }
}
