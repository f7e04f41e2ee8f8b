pub mod app_state;
pub mod constants;
pub mod form;
pub mod llm_interaction;
pub mod prompt;
pub mod session;
pub mod web_server;

pub use form::{FormError, FormState, Gender, PersonProfile, Profiles, RelationshipType};
pub use llm_interaction::{GeminiClient, GenerationError, GenerationRequest, TextGenerator};
pub use session::{CounselSession, ResponseState, SubmitOutcome};
