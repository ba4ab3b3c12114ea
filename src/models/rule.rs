//! Rejection rule model: the declarative form read from configuration and
//! the compiled form used during evaluation.

use regex::Regex;
use serde::Deserialize;

/// A rejection rule as declared in `config.toml`.
///
/// Patterns are kept as raw strings here; [`crate::policy::compiler::RuleCompiler`]
/// turns them into [`CompiledRule`]s.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RejectionRule {
    /// Human-readable rule name, used in logs.
    pub name: String,
    /// Acceptable-justification pattern. A request whose reason does *not*
    /// match is denied by this rule.
    #[serde(default)]
    pub reason_regex: Option<String>,
    /// Role filter. The rule only applies when at least one requested role
    /// matches.
    #[serde(default)]
    pub roles_regex: Option<String>,
    /// Denial text sent with the transition. Empty means the default message.
    #[serde(default)]
    pub message: String,
}

/// A [`RejectionRule`] with its patterns compiled.
///
/// A `None` matcher places no constraint on its stage.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule name copied from the declaration.
    pub name: String,
    /// Compiled acceptable-justification pattern.
    pub reason: Option<Regex>,
    /// Compiled role filter.
    pub roles: Option<Regex>,
    /// Denial text; may be empty.
    pub message: String,
}

impl CompiledRule {
    /// The denial text for this rule, falling back to `default_message`
    /// when the rule declares none.
    #[must_use]
    pub fn message_or<'a>(&'a self, default_message: &'a str) -> &'a str {
        if self.message.is_empty() {
            default_message
        } else {
            &self.message
        }
    }
}

/// Ordered, immutable collection of compiled rules.
///
/// Declaration order is evaluation order. Instances are only produced by
/// the rule compiler.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub(crate) fn new(rules: Vec<CompiledRule>) -> Self {
        Self { rules }
    }

    /// Iterate rules in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, CompiledRule> {
        self.rules.iter()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a CompiledRule;
    type IntoIter = std::slice::Iter<'a, CompiledRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
