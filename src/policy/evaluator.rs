//! Rejection policy evaluator.
//!
//! Decides whether an access request should be denied. Each rule is
//! evaluated in two stages:
//!
//! 1. **Role filter**: does the rule apply to this request at all? A rule
//!    with a roles pattern applies when any requested role matches it; a
//!    rule without one applies to every request.
//! 2. **Reason check**: the reason pattern describes an *acceptable*
//!    justification. A reason that does not match triggers the rule. A rule
//!    without a reason pattern triggers whenever it applies.
//!
//! The first triggering rule wins. Evaluation never mutates its inputs.

use tracing::{debug, info, info_span};

use crate::models::request::AccessRequest;
use crate::models::rule::{CompiledRule, RuleSet};

/// Evaluates a compiled [`RuleSet`] against access requests.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    rules: RuleSet,
}

impl PolicyEvaluator {
    /// Wrap a compiled rule set.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// The rules this evaluator applies, in order.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Return the first rule that triggers a denial for `request`, or
    /// `None` when the request should be left for human review.
    #[must_use]
    pub fn decide(&self, request: &AccessRequest) -> Option<&CompiledRule> {
        let _span = info_span!("policy_decide", request_id = %request.id).entered();

        for rule in &self.rules {
            // ── Stage 1: role filter ─────────────────────────
            match &rule.roles {
                Some(pattern) => match matching_role(pattern, &request.roles) {
                    Some(role) => debug!(
                        rule = %rule.name,
                        role,
                        pattern = pattern.as_str(),
                        "rule applies, role matches"
                    ),
                    None => {
                        debug!(
                            rule = %rule.name,
                            roles = ?request.roles,
                            pattern = pattern.as_str(),
                            "rule does not apply, no role matches"
                        );
                        continue;
                    }
                },
                None => debug!(rule = %rule.name, "rule applies, no role filter"),
            }

            // ── Stage 2: reason check ────────────────────────
            match &rule.reason {
                Some(pattern) if pattern.is_match(&request.reason) => {
                    debug!(
                        rule = %rule.name,
                        pattern = pattern.as_str(),
                        "reason is acceptable, rule not triggered"
                    );
                }
                Some(pattern) => {
                    info!(
                        rule = %rule.name,
                        pattern = pattern.as_str(),
                        reason = %request.reason,
                        "reason does not match required pattern"
                    );
                    return Some(rule);
                }
                None => {
                    info!(rule = %rule.name, "role-only rule triggered");
                    return Some(rule);
                }
            }
        }

        None
    }
}

/// First requested role matched by `pattern`.
fn matching_role<'a>(pattern: &regex::Regex, roles: &'a [String]) -> Option<&'a str> {
    roles
        .iter()
        .map(String::as_str)
        .find(|role| pattern.is_match(role))
}
