//! Rule conditions: a small boolean language over [`RequestFacts`].
//!
//! A condition is either a leaf comparison written as a string,
//!
//! ```text
//! <property> <op> <value>        op: =  !=  ~=  !~=
//! ```
//!
//! or a single-key mapping combining other conditions:
//!
//! ```yaml
//! all:
//!   - any:
//!       - gitlab_event = "Push Hook"
//!       - gitlab_event = "Tag Push Hook"
//!   - not: gitlab_host ~= ^invalid\.
//! ```
//!
//! `~=` and `!~=` search anywhere in the value; anchor the pattern with `^`/`$`
//! when a full match is wanted. An empty `all` is true and an empty `any` is false.

use regex::Regex;
use serde_yaml::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::webhook::{Property, RequestFacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    RegexMatch,
    RegexNotMatch,
}

impl Operator {
    /// Longest tokens first so `!~=` is not read as `!=`.
    const TOKENS: [(&'static str, Operator); 4] = [
        ("!~=", Operator::RegexNotMatch),
        ("!=", Operator::NotEq),
        ("~=", Operator::RegexMatch),
        ("=", Operator::Eq),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::RegexMatch => "~=",
            Operator::RegexNotMatch => "!~=",
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Operator::RegexMatch | Operator::RegexNotMatch)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf of the condition tree. Regex operands are compiled on construction.
#[derive(Debug, Clone)]
pub struct Comparison {
    property: Property,
    operator: Operator,
    value: String,
    pattern: Option<Regex>,
}

impl Comparison {
    pub fn new(
        property: Property,
        operator: Operator,
        value: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let value = value.into();
        let pattern = if operator.is_regex() {
            let compiled = Regex::new(&value).map_err(|source| ConfigError::InvalidRegex {
                pattern: value.clone(),
                source,
            })?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self {
            property,
            operator,
            value,
            pattern,
        })
    }

    pub fn property(&self) -> Property {
        self.property
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn evaluate(&self, facts: &RequestFacts) -> bool {
        let actual = facts.get(self.property);
        match (self.operator, &self.pattern) {
            (Operator::Eq, _) => actual == self.value,
            (Operator::NotEq, _) => actual != self.value,
            (Operator::RegexMatch, Some(re)) => re.is_match(actual),
            (Operator::RegexNotMatch, Some(re)) => !re.is_match(actual),
            // `new` always compiles a pattern for regex operators
            (Operator::RegexMatch | Operator::RegexNotMatch, None) => false,
        }
    }
}

impl PartialEq for Comparison {
    fn eq(&self, other: &Self) -> bool {
        self.property == other.property
            && self.operator == other.operator
            && self.value == other.value
    }
}

impl FromStr for Comparison {
    type Err = ConfigError;

    /// Parses `<property> <op> <value>`.
    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let split = expr
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c.is_whitespace()))
            .unwrap_or(expr.len());
        let (lhs, rest) = expr.split_at(split);

        let name = lhs.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidExpression(format!(
                "'{expr}' is missing a property name"
            )));
        }
        if rest.is_empty() {
            return Err(ConfigError::UnknownOperator(expr.to_string()));
        }

        let (token, operator) = Operator::TOKENS
            .into_iter()
            .find(|(token, _)| rest.starts_with(token))
            .ok_or_else(|| ConfigError::UnknownOperator(expr.to_string()))?;

        let property: Property = name.parse()?;
        let value = unquote(rest[token.len()..].trim());

        Comparison::new(property, operator, value)
    }
}

/// Strips one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// A parsed, validated condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison(Comparison),
    Any(Vec<Condition>),
    All(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn comparison(
        property: Property,
        operator: Operator,
        value: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Comparison::new(property, operator, value).map(Condition::Comparison)
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Whether the condition holds for the given facts.
    pub fn evaluate(&self, facts: &RequestFacts) -> bool {
        match self {
            Condition::Comparison(cmp) => cmp.evaluate(facts),
            Condition::Any(children) => children.iter().any(|c| c.evaluate(facts)),
            Condition::All(children) => children.iter().all(|c| c.evaluate(facts)),
            Condition::Not(child) => !child.evaluate(facts),
        }
    }

    /// Parses a condition from its YAML form
    pub fn from_yaml(node: &Value) -> Result<Self, ConfigError> {
        match node {
            Value::String(expr) => expr.parse().map(Condition::Comparison),
            Value::Mapping(map) => {
                if map.len() != 1 {
                    return Err(ConfigError::InvalidExpression(format!(
                        "a combinator mapping must have exactly one key, found {}",
                        map.len()
                    )));
                }
                let Some((key, operand)) = map.iter().next() else {
                    return Err(ConfigError::InvalidExpression(
                        "empty combinator mapping".to_string(),
                    ));
                };
                let Some(key) = key.as_str() else {
                    return Err(ConfigError::InvalidExpression(format!(
                        "combinator key must be a string, found {key:?}"
                    )));
                };

                match key.to_ascii_lowercase().as_str() {
                    "any" => Ok(Condition::Any(parse_children("any", operand)?)),
                    "all" => Ok(Condition::All(parse_children("all", operand)?)),
                    "not" => parse_negated(operand),
                    other => Err(ConfigError::InvalidExpression(format!(
                        "'{other}' is not a combinator (expected any, all or not)"
                    ))),
                }
            }
            Value::Tagged(tagged) => Condition::from_yaml(&tagged.value),
            other => Err(ConfigError::InvalidExpression(format!(
                "expected a string or a mapping, found {other:?}"
            ))),
        }
    }
}

fn parse_children(kind: &str, operand: &Value) -> Result<Vec<Condition>, ConfigError> {
    let Value::Sequence(items) = operand else {
        return Err(ConfigError::InvalidExpression(format!(
            "'{kind}' expects a list of conditions"
        )));
    };
    items.iter().map(Condition::from_yaml).collect()
}

/// `not` takes one condition. A one-element list is accepted too.
fn parse_negated(operand: &Value) -> Result<Condition, ConfigError> {
    match operand {
        Value::Sequence(items) if items.len() == 1 => {
            Ok(Condition::not(Condition::from_yaml(&items[0])?))
        }
        Value::Sequence(items) => Err(ConfigError::InvalidExpression(format!(
            "'not' expects a single condition, found a list of {}",
            items.len()
        ))),
        node => Ok(Condition::not(Condition::from_yaml(node)?)),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, children: &[Condition]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comparison(cmp) => {
                write!(f, "{} {} {}", cmp.property, cmp.operator, cmp.value)
            }
            Condition::Any(children) => write_list(f, "any", children),
            Condition::All(children) => write_list(f, "all", children),
            Condition::Not(child) => write!(f, "not({child})"),
        }
    }
}
