//! Pattern rules over relative content paths.

use crate::content::ContentDescriptor;
use crate::error::BuildError;

/// The pattern half of a rule: wildcard or regex.
#[derive(Debug, Clone)]
pub enum RulePattern {
    /// Glob-style wildcard (`textures/**/*.png`)
    Wildcard(glob::Pattern),
    /// Regular expression matched anywhere in the path
    Regex(regex::Regex),
}

impl RulePattern {
    pub fn is_match(&self, path: &str) -> bool {
        let path = super::normalize_path(path);
        match self {
            RulePattern::Wildcard(p) => p.matches(&path),
            RulePattern::Regex(r) => r.is_match(&path),
        }
    }
}

/// What a matching rule does with a path.
#[derive(Debug, Clone)]
pub enum RuleAction {
    /// Handle the file with this descriptor template
    Include(ContentDescriptor),
    /// The file is not handled at all
    Exclude,
}

/// An ordered pattern rule: later-registered rules take precedence.
#[derive(Debug, Clone)]
pub struct ContentRule {
    pattern: RulePattern,
    action: RuleAction,
}

impl ContentRule {
    /// Rule from a glob-style wildcard pattern.
    pub fn wildcard(pattern: &str, action: RuleAction) -> Result<Self, BuildError> {
        let compiled = glob::Pattern::new(pattern).map_err(|e| BuildError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: RulePattern::Wildcard(compiled),
            action,
        })
    }

    /// Rule from a regular expression.
    pub fn regex(pattern: &str, action: RuleAction) -> Result<Self, BuildError> {
        let compiled = regex::Regex::new(pattern).map_err(|e| BuildError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: RulePattern::Regex(compiled),
            action,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }
}
