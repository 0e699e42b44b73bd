mod client;

pub use client::{OpenAIClient, DEFAULT_MODEL};
