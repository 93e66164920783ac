//! verifiers: an evaluation harness for LLM rollouts.
//!
//! Environments pose questions to a model, parse structured tags out of the
//! free-text response, and score the result against a ground truth with a
//! weighted rubric. The pieces compose left to right:
//!
//! - [`dataset`] -- labeled examples with copy-on-write transforms.
//! - [`model`] -- OpenAI-compatible inference clients and prompt data.
//! - [`parser`] -- answer extraction from tagged model output.
//! - [`rubric`] -- weighted reward metrics reducing to one score.
//! - [`tool`] -- schema-described capabilities the model can invoke.
//! - [`env`] -- single- and multi-turn rollout loops, plus task routing.
//! - [`batch`] -- bounded-concurrency fan-out with per-item deadlines.
//! - [`eval`] -- batched rollouts folded into a scored report.

pub mod batch;
pub mod config;
pub mod dataset;
pub mod env;
pub mod eval;
pub mod model;
pub mod parser;
pub mod rubric;
pub mod tool;
