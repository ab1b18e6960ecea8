//! Rule set loading and matching

use serde::Deserialize;
use std::path::Path;

use crate::condition::Condition;
use crate::error::ConfigError;
use crate::webhook::RequestFacts;

/// A condition paired with the shell command to run when it holds
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub action: String,
}

impl Rule {
    pub fn new(condition: Condition, action: impl Into<String>) -> Result<Self, ConfigError> {
        let action = action.into();
        if action.trim().is_empty() {
            return Err(ConfigError::EmptyAction);
        }
        Ok(Self { condition, action })
    }

    pub fn matches(&self, facts: &RequestFacts) -> bool {
        self.condition.evaluate(facts)
    }
}

/// Shape of one entry in the rules file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    condition: serde_yaml::Value,
    action: String,
}

impl TryFrom<RuleEntry> for Rule {
    type Error = ConfigError;

    fn try_from(entry: RuleEntry) -> Result<Self, Self::Error> {
        let condition = Condition::from_yaml(&entry.condition)?;
        Rule::new(condition, entry.action)
    }
}

/// Ordered, non-empty list of rules. Built once at startup and never modified.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::EmptyRuleSet);
        }
        Ok(Self { rules })
    }

    /// Parses a rule set from YAML. Any invalid rule fails the whole set.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Err(ConfigError::EmptyRuleSet);
        }
        let entries: Option<Vec<RuleEntry>> = serde_yaml::from_str(yaml)?;
        let rules = entries
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| Rule::try_from(entry).map_err(|e| e.in_rule(idx + 1)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    /// Load and parse the rules file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Lazily yields `(rule number, rule)` for every matching rule, in declared order.
    /// Rule numbers are 1-based.
    pub fn matching<'a, 'f>(
        &'a self,
        facts: &'f RequestFacts,
    ) -> impl Iterator<Item = (usize, &'a Rule)> {
        self.rules
            .iter()
            .enumerate()
            .filter(move |(_, rule)| rule.matches(facts))
            .map(|(idx, rule)| (idx + 1, rule))
    }

    /// All rules whose condition holds. Every match counts, not just the first.
    pub fn matches(&self, facts: &RequestFacts) -> Vec<&Rule> {
        self.matching(facts).map(|(_, rule)| rule).collect()
    }
}
