//! Generation-provider clients.

pub mod openai;

pub use openai::OpenAiImageProvider;
