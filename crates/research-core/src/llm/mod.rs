//! Text-generation port
//!
//! The research components never talk to a model vendor directly. They build a
//! [`GenerationRequest`] (a prompt plus an optional JSON schema) and hand it to
//! a [`TextGenerator`]:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Planner / Extractor / Feedback / Report  │
//! └─────────────────┬────────────────────────┘
//!                   │ generate_object::<T>()
//!                   ▼
//! ┌──────────────────────────────────────────┐
//! │        TextGenerator (trait)             │
//! └─────────────────┬────────────────────────┘
//!                   │ implemented by
//!                   ▼
//! ┌──────────────────────────────────────────┐
//! │   RigGenerator (wraps any Rig Agent<M>)  │
//! └──────────────────────────────────────────┘
//! ```

mod config;
mod json;
mod provider;

pub use config::LLMConfig;
pub use json::{generate_object, parse_json_response};
pub use provider::{GenerationRequest, TextGenerator};
