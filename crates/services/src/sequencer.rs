use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rng};

use proctor_core::model::{AnswerOption, AssessmentDefinition, AssessmentError, Question};

/// Fixed presentation order for one session.
///
/// Positions index the display order; the stored values are authoring indices into
/// `AssessmentDefinition::questions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    questions: Vec<usize>,
    options: Vec<Vec<usize>>,
}

impl Sequence {
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Authoring index of the question shown at `position`.
    #[must_use]
    pub fn question_index(&self, position: usize) -> Option<usize> {
        self.questions.get(position).copied()
    }

    #[must_use]
    pub fn question_order(&self) -> &[usize] {
        &self.questions
    }

    /// Display order of the options of the question at authoring index `question`.
    #[must_use]
    pub fn option_order(&self, question: usize) -> &[usize] {
        self.options.get(question).map_or(&[], Vec::as_slice)
    }

    /// Options of `question` in display order.
    #[must_use]
    pub fn options_for<'a>(&self, question: usize, source: &'a Question) -> Vec<&'a AnswerOption> {
        self.option_order(question)
            .iter()
            .filter_map(|&i| source.options().get(i))
            .collect()
    }

    fn build<R: Rng + ?Sized>(definition: &AssessmentDefinition, rng: &mut R) -> Self {
        let settings = definition.settings();
        let mut questions: Vec<usize> = (0..definition.question_count()).collect();
        if settings.shuffle_questions {
            questions.as_mut_slice().shuffle(rng);
        }

        let options = definition
            .questions()
            .iter()
            .map(|question| {
                let mut order: Vec<usize> = (0..question.options().len()).collect();
                if settings.shuffle_options && question.kind().is_choice() {
                    order.as_mut_slice().shuffle(rng);
                }
                order
            })
            .collect();

        Self { questions, options }
    }
}

/// Computes the presentation order once and hands out the same value afterwards.
#[derive(Debug, Default)]
pub struct QuestionSequencer {
    seed: Option<u64>,
    sequence: OnceLock<Sequence>,
}

impl QuestionSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic shuffling for tests and reproducible sittings.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            sequence: OnceLock::new(),
        }
    }

    /// Sequence for `definition`, computed on the first call.
    ///
    /// Later calls return the cached order even if the definition's settings differ.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::NoQuestions` if the definition has no questions.
    pub fn sequence(&self, definition: &AssessmentDefinition) -> Result<&Sequence, AssessmentError> {
        if let Some(sequence) = self.sequence.get() {
            return Ok(sequence);
        }
        if definition.question_count() == 0 {
            return Err(AssessmentError::NoQuestions);
        }

        let built = match self.seed {
            Some(seed) => Sequence::build(definition, &mut StdRng::seed_from_u64(seed)),
            None => Sequence::build(definition, &mut rng()),
        };
        Ok(self.sequence.get_or_init(|| built))
    }

    /// The cached sequence, once `sequence` has run.
    #[must_use]
    pub fn computed(&self) -> Option<&Sequence> {
        self.sequence.get()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.sequence.get().is_some()
    }
}
