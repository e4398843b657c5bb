//! Schema module
//!
//! Wire types for the Gemini REST API.

pub mod gemini;

pub use gemini::{
    GeminiContent, GeminiError, GeminiRequest, GeminiResponse, GenerationConfig, Part,
    Tool,
};
