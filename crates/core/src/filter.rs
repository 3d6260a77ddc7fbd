use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::model::document::Metadata;

/// Boolean combination of `key == 'value'` comparisons over document metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterExpr {
    Eq { key: String, value: String },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Conjunction that flattens nested `And`s so rendering stays readable.
    pub fn and(self, other: FilterExpr) -> Self {
        let mut terms = match self {
            Self::And(terms) => terms,
            other => vec![other],
        };
        match other {
            Self::And(more) => terms.extend(more),
            other => terms.push(other),
        }
        Self::And(terms)
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq { key, value } => metadata.get(key).is_some_and(|v| v == value),
            Self::And(terms) => terms.iter().all(|t| t.matches(metadata)),
            Self::Or(terms) => terms.iter().any(|t| t.matches(metadata)),
        }
    }

    /// Parses `a == 'x' && b == 'y'` and `... || ...`; `&&` binds tighter.
    /// Parentheses are not supported.
    pub fn parse(input: &str) -> Result<Self> {
        let alternatives = input
            .split("||")
            .map(parse_conjunction)
            .collect::<Result<Vec<_>>>()?;
        Ok(collapse(alternatives, Self::Or))
    }
}

fn parse_conjunction(input: &str) -> Result<FilterExpr> {
    let terms = input
        .split("&&")
        .map(parse_comparison)
        .collect::<Result<Vec<_>>>()?;
    Ok(collapse(terms, FilterExpr::And))
}

fn parse_comparison(input: &str) -> Result<FilterExpr> {
    static TERM: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TERM
        .get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*==\s*'([^']*)'\s*$").ok())
        .as_ref()
        .ok_or_else(|| TriageError::Parse("filter term pattern failed to compile".into()))?;
    let caps = re
        .captures(input)
        .ok_or_else(|| TriageError::Parse(format!("invalid filter term: {}", input.trim())))?;
    Ok(FilterExpr::eq(&caps[1], &caps[2]))
}

fn collapse(mut terms: Vec<FilterExpr>, wrap: fn(Vec<FilterExpr>) -> FilterExpr) -> FilterExpr {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        wrap(terms)
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { key, value } => write!(f, "{key} == '{value}'"),
            Self::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    match term {
                        Self::Or(_) => write!(f, "({term})")?,
                        _ => write!(f, "{term}")?,
                    }
                }
                Ok(())
            }
            Self::Or(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for FilterExpr {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
