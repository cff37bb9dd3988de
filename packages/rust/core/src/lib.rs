//! Dataset generation and curation for SynthKit.
//!
//! This crate ties document ingest, chunking, LLM generation, LLM-as-judge
//! curation and format export into file-to-file stages (see [`pipeline`]).

pub mod accumulator;
pub mod chunker;
pub mod curator;
pub mod enhancer;
pub mod generator;
pub mod judge;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod response;
pub mod retry;
pub mod summary;

pub use accumulator::{AccumulateOutcome, Accumulator, ChunkGenerator};
pub use chunker::{Chunker, Chunks};
pub use curator::{CurationOutcome, Curator};
pub use enhancer::{ConversationEnhancer, CotEnhancer, EnhanceOutcome, LlmEnhancer};
pub use generator::{LlmGenerator, items_per_chunk};
pub use judge::{Judge, LlmJudge, Verdict};
pub use pipeline::{
    BatchSummary, CreateResult, CurateResult, EnhanceResult, Pipeline, RunOptions, RunReport, ingest_source,
    save_dataset,
};
pub use progress::{ProgressReporter, SilentProgress};
pub use retry::{RetryOutcome, RetryPolicy};
pub use summary::RollingSummarizer;
