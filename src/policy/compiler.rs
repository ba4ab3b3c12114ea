//! Rejection rule compiler.
//!
//! Turns the declared [`RejectionRule`] list into a [`RuleSet`]. Any invalid
//! pattern fails the whole compilation: a partial rule set is never
//! produced, and the service refuses to start.

use regex::Regex;
use tracing::{debug, info};

use crate::models::rule::{CompiledRule, RejectionRule, RuleSet};
use crate::{AppError, Result};

/// Compiles declared rules into matchers.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compile `rules` in declaration order.
    ///
    /// An absent or empty pattern compiles to "no constraint" for its stage.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidRule`] naming the first rule whose reason
    /// or roles pattern is not a valid regular expression.
    pub fn compile(rules: &[RejectionRule]) -> Result<RuleSet> {
        let compiled = rules
            .iter()
            .map(Self::compile_rule)
            .collect::<Result<Vec<_>>>()?;

        info!(count = compiled.len(), "compiled rejection rules");
        Ok(RuleSet::new(compiled))
    }

    fn compile_rule(rule: &RejectionRule) -> Result<CompiledRule> {
        let reason = compile_pattern(&rule.name, rule.reason_regex.as_deref())?;
        let roles = compile_pattern(&rule.name, rule.roles_regex.as_deref())?;

        debug!(
            rule = %rule.name,
            has_reason = reason.is_some(),
            has_roles = roles.is_some(),
            "compiled rule"
        );

        Ok(CompiledRule {
            name: rule.name.clone(),
            reason,
            roles,
            message: rule.message.clone(),
        })
    }
}

fn compile_pattern(rule: &str, pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern {
        None | Some("") => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|err| AppError::InvalidRule {
                rule: rule.to_owned(),
                pattern: pattern.to_owned(),
                reason: err.to_string(),
            }),
    }
}
