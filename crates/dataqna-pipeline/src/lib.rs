//! Retrieval-augmented SQL generation pipeline
//!
//! A [`Pipeline`] turns a [`Question`](dataqna_core::Question) into vetted SQL:
//! exact-match cache, similarity retrieval of schema and example context, an
//! LLM builder and a bounded validate/correct loop. It can then execute the
//! statement and summarize the rows. Every request leaves exactly one audit
//! entry behind.

pub mod config;
pub mod debug;
pub mod error;
pub mod pipeline;

pub use config::PipelineConfig;
pub use debug::{DebugLoop, DebugOutcome};
pub use error::PipelineError;
pub use pipeline::{Collaborators, GeneratedSql, NaturalResponse, Pipeline, EXECUTION_DISABLED};
