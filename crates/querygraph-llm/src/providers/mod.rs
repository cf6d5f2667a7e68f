pub mod gemini;
pub mod openai;

pub use gemini::GeminiReasoner;
pub use openai::OpenAiReasoner;
