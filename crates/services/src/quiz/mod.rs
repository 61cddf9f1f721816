mod engine;
mod timer;
mod workflow;

// Public API of the quiz subsystem.
pub use engine::{QuizEngine, SubmissionState, Tick};
pub use timer::QuizTimer;
pub use workflow::QuizLoopService;
