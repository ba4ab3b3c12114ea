//! Rejection policy modules.
//!
//! Rules are compiled once at startup by [`compiler::RuleCompiler`] and
//! evaluated per request by [`evaluator::PolicyEvaluator`].

pub mod compiler;
pub mod evaluator;
