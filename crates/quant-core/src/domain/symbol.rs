use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

const MAX_SYMBOL_LEN: usize = 15;

/// Bare crypto tickers that are quoted against USD upstream.
const USD_QUOTED_CRYPTO: &[&str] = &["BTC", "ETH"];

/// Normalized ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, AnalysisError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AnalysisError::Validation("ticker symbol is empty".to_string()));
        }

        let mut normalized = trimmed.to_ascii_uppercase();
        if USD_QUOTED_CRYPTO.contains(&normalized.as_str()) {
            normalized.push_str("-USD");
        }

        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(AnalysisError::Validation(format!(
                "ticker symbol is {len} characters, maximum is {MAX_SYMBOL_LEN}"
            )));
        }

        if let Some(first) = normalized.chars().next() {
            if !(first.is_ascii_alphabetic() || first == '^') {
                return Err(AnalysisError::Validation(format!(
                    "ticker symbol must start with a letter or '^', got '{first}'"
                )));
            }
        }

        for (index, ch) in normalized.chars().enumerate().skip(1) {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '^' | '=');
            if !valid {
                return Err(AnalysisError::Validation(format!(
                    "invalid character '{ch}' at position {index} in ticker symbol"
                )));
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = AnalysisError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
