//! Core persona type.
//!
//! A persona is a named writing style used to voice generated comments.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// A named generation style.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, unique within a registry.
    pub name: String,

    /// Free-text description of voice and tone, fed into comment prompts.
    pub style: String,
}

impl Persona {
    /// Build a persona without validation.
    pub fn new(name: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: style.into(),
        }
    }

    /// Trim both fields and reject empty ones.
    pub fn validated(name: &str, style: &str) -> Result<Self> {
        let name = name.trim();
        let style = style.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        if style.is_empty() {
            return Err(Error::validation("style", "must not be empty"));
        }
        Ok(Self::new(name, style))
    }

    /// The personas a fresh registry starts with.
    pub fn defaults() -> Vec<Persona> {
        vec![
            Persona::new("Alex Tech", "Technical expert, precise, uses jargon naturally"),
            Persona::new("Sam Casual", "Friendly, uses emojis naturally, conversational"),
            Persona::new("Dr. Morgan", "Academic tone, analytical, cites studies naturally"),
            Persona::new("Charlie", "Sarcastic internet troll, uses slang, contrarian"),
        ]
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_trims_fields() {
        let p = Persona::validated("  Alex  ", "\tterse\n").unwrap();
        assert_eq!(p.name, "Alex");
        assert_eq!(p.style, "terse");
    }

    #[test]
    fn test_validated_rejects_blank() {
        assert!(Persona::validated("   ", "style").is_err());
        assert!(Persona::validated("name", "").is_err());
    }

    #[test]
    fn test_defaults_have_unique_names() {
        let defaults = Persona::defaults();
        let mut names: Vec<_> = defaults.iter().map(|p| p.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), defaults.len());
    }
}
