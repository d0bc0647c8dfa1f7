//! Plan generation pipeline
//!
//! Four stages over two providers: the analyst researches the business
//! (JSON), the strategist drafts the ten-section plan in two concurrent
//! halves (markdown), the reviewer critiques the draft (JSON), and the
//! finalizer folds the critique back in, again in two halves. The
//! orchestrator chains them over a pending plan and seals the terminal
//! state.
//!
//! Every model call is accounted as a usage log entry; the completed plan's
//! total cost is the sum of its entries.

mod analyst;
mod context;
mod finalizer;
mod orchestrator;
mod reviewer;
mod strategist;
pub mod types;

pub use context::{ModelTiers, PipelineContext};
pub use orchestrator::run_pipeline;

#[cfg(test)]
pub(crate) use context::testing;
