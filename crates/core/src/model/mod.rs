mod answer;
mod assessment;
mod ids;
mod live;
mod question;
mod session;
mod submission;

pub use ids::{
    AssessmentId, LibraryItemId, LiveSessionId, OptionId, ParseIdError, ParticipantId,
    QuestionId, SubmissionId,
};

pub use answer::{AnswerError, AnswerValue};
pub use assessment::{AssessmentDefinition, AssessmentDraft, AssessmentError, AssessmentSettings};
pub use live::{FocusEvent, LiveSchedule, LiveSessionStatus, ParticipantProgress, ProgressEvent};
pub use question::{AnswerOption, Question, QuestionDraft, QuestionError, QuestionKind};
pub use session::{Cursor, SessionState, SessionStateError, SessionStatus};
pub use submission::{SubmissionPayload, SubmissionReceipt, SubmitTrigger, SubmittedAnswer};
