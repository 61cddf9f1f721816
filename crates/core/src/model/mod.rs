mod attempt;
mod ids;
mod quiz;
mod session;

pub use attempt::{AttemptError, QuizAttempt, UNANSWERED};
pub use ids::{AttemptId, Identity, QuizId, SessionToken};
pub use quiz::{OPTIONS_PER_QUESTION, Question, QuizDefinition, QuizError};
pub use session::SessionRecord;
