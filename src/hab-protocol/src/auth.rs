// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bearer-token authorization for protocol clients.

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    Missing,
    #[error("invalid authorization token")]
    Invalid,
}

/// Remove an optional `Bearer ` scheme (any case) and surrounding blanks.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => trimmed,
    }
}

/// Decides whether a request may proceed.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// Accepts any of a fixed set of tokens. An empty set disables auth.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    tokens: HashSet<String>,
}

impl TokenSet {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.trim().is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for TokenSet {
    fn validate(&self, token: Option<&str>) -> Result<(), AuthError> {
        if self.tokens.is_empty() {
            return Ok(());
        }
        let token = token.map(strip_bearer).filter(|t| !t.is_empty());
        match token {
            None => Err(AuthError::Missing),
            Some(t) if self.tokens.contains(t) => Ok(()),
            Some(_) => Err(AuthError::Invalid),
        }
    }
}

/// Validator used when the listener has authentication turned off.
pub struct NoAuthValidator;

impl TokenValidator for NoAuthValidator {
    fn validate(&self, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}
