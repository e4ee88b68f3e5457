//! Tool registry & invocation: named external capabilities that agents
//! may request via `ExternalAction`, executed by the orchestrator with
//! schema validation, per-tool rate limiting, and a deadline.
//!
//! Name-keyed registry over a lock-free `DashMap`, and throttled by
//! `control::rate_limit::TokenBucket` — the same primitive ingress
//! rate limiting uses.

pub mod registry;

pub use registry::{ExternalAction, ToolDescriptor, ToolInvocationResult, ToolRegistry};
