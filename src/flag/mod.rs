mod materializer;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use materializer::materialize;

/// The declared type of a flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FlagType {
    String,
    Boolean,
    Number,
    Json,
}

/// The flag being removed and the value it is fixed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub key: String,
    pub flag_type: FlagType,
    /// The raw value, coerced according to `flag_type`.
    pub value: String,
    /// Variable names that hold the key in the source, e.g. a module level
    /// constant `SHOW_BUTTON = "show-button"`.
    pub aliases: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum TypeCoercionError {
    #[error("Unknown flag type '{name}', expected one of String, Boolean, Number, JSON")]
    UnknownType { name: String },

    #[error("Value {value:?} of flag '{key}' is not a number")]
    InvalidNumber { key: String, value: String },

    #[error("Value of flag '{key}' is not valid JSON: {source}")]
    InvalidJson {
        key: String,
        source: serde_json::Error,
    },
}

impl FlagSpec {
    pub fn new(key: impl Into<String>, flag_type: FlagType, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            flag_type,
            value: value.into(),
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }
}

impl FromStr for FlagType {
    type Err = TypeCoercionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(FlagType::String),
            "boolean" => Ok(FlagType::Boolean),
            "number" => Ok(FlagType::Number),
            "json" => Ok(FlagType::Json),
            _ => Err(TypeCoercionError::UnknownType {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagType::String => write!(f, "String"),
            FlagType::Boolean => write!(f, "Boolean"),
            FlagType::Number => write!(f, "Number"),
            FlagType::Json => write!(f, "JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_type_should_parse_case_insensitively() {
        assert_eq!("JSON".parse::<FlagType>().ok(), Some(FlagType::Json));
        assert_eq!("boolean".parse::<FlagType>().ok(), Some(FlagType::Boolean));
        assert_eq!("Number".parse::<FlagType>().ok(), Some(FlagType::Number));
        assert!(matches!(
            "float".parse::<FlagType>(),
            Err(TypeCoercionError::UnknownType { .. })
        ));
    }
}
