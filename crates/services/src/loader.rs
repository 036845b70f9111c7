use std::sync::Arc;

use gateway::AssessmentApi;
use proctor_core::model::{AssessmentDefinition, AssessmentId};
use tracing::{info, warn};

use crate::error::LoadError;

/// Fetches an assessment and validates it before a session may be built.
#[derive(Clone)]
pub struct AssessmentLoader {
    api: Arc<dyn AssessmentApi>,
}

impl AssessmentLoader {
    #[must_use]
    pub fn new(api: Arc<dyn AssessmentApi>) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns `LoadError::Fetch` when the backend call fails and
    /// `LoadError::Invalid` when the definition does not validate.
    pub async fn load(&self, id: AssessmentId) -> Result<AssessmentDefinition, LoadError> {
        let draft = self.api.fetch_assessment(id).await.map_err(|err| {
            warn!(assessment_id = %id, error = %err, "assessment fetch failed");
            LoadError::Fetch(err)
        })?;
        let definition = draft.validate()?;
        info!(
            assessment_id = %id,
            questions = definition.question_count(),
            "assessment loaded"
        );
        Ok(definition)
    }
}
