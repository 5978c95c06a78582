//! Smoke-test harness for MCP wrapper launch scripts.
//!
//! A wrapper is expected to start a long-running MCP server speaking
//! JSON-RPC over stdio. Anything it prints on stdout that is not protocol
//! framing (headers, JSON values) corrupts the stream for the client, so
//! this crate runs each wrapper for a bounded wall-clock budget, captures
//! its output, classifies every stdout line, and turns the result into a
//! pass/skip/fail verdict per wrapper.

pub mod classify;
pub mod evaluate;
pub mod harness;
pub mod runner;

pub use classify::{classify, LineVerdict};
pub use evaluate::{evaluate, VerdictStatus, WrapperVerdict};
pub use harness::{resolve_candidates, HarnessConfig, HarnessResult};
pub use runner::{run_with_timeout, RunOutcome, RunnerError};
