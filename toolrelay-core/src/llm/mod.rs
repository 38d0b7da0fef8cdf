//! Language-model backed [`DecisionSource`](crate::decision::DecisionSource).

pub mod openai;
pub mod prompt;
pub mod reply;

pub use openai::OpenAiDecisionSource;
pub use reply::{first_json_object, parse_decision};
