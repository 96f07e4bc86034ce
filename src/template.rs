//! Host templates: host addresses with a single team placeholder
//!
//! A template such as `10.{team}.1.5` describes the same machine in every
//! team's copy of the network. Rendering substitutes a team number, and
//! [`HostTemplate::from_concrete`] goes the other way for hosts discovered in
//! the reference team's subnet.

use std::fmt;

use crate::error::TemplateError;

/// Build the placeholder token for a placeholder name (`team` → `{team}`)
pub fn placeholder_token(name: &str) -> String {
    format!("{{{name}}}")
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostTemplate {
    raw: String,
    token_at: usize,
    token_len: usize,
}

impl HostTemplate {
    /// Parse a template, requiring exactly one occurrence of `token`
    pub fn parse(raw: impl Into<String>, token: &str) -> Result<Self, TemplateError> {
        let raw = raw.into();

        let Some(token_at) = raw.find(token) else {
            return Err(TemplateError::MissingPlaceholder {
                template: raw,
                token: token.to_string(),
            });
        };

        if raw[token_at + token.len()..].contains(token) {
            return Err(TemplateError::RepeatedPlaceholder {
                template: raw,
                token: token.to_string(),
            });
        }

        Ok(Self {
            raw,
            token_at,
            token_len: token.len(),
        })
    }

    /// Derive a template from a host found in the reference team's subnet.
    ///
    /// `pattern` is the configured subnet pattern (e.g. `10.{team}.1.0/24`).
    /// The host has to start with the pattern's text before the placeholder,
    /// followed by the reference team; whatever follows is kept verbatim.
    pub fn from_concrete(
        pattern: &HostTemplate,
        host: &str,
        reference_team: u32,
    ) -> Result<Self, TemplateError> {
        let prefix = pattern.prefix();
        let team = reference_team.to_string();

        let rest = host
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(team.as_str()))
            // the team must not be the leading part of a longer number
            .filter(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
            .ok_or_else(|| TemplateError::NotInvertible {
                host: host.to_string(),
                pattern: pattern.raw.clone(),
                team: reference_team,
            })?;

        let token = pattern.token();
        Self::parse(format!("{prefix}{token}{rest}"), token)
    }

    /// Substitute `team` for the placeholder
    pub fn render(&self, team: u32) -> String {
        format!("{}{team}{}", self.prefix(), self.suffix())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The placeholder token this template was parsed with
    pub fn token(&self) -> &str {
        &self.raw[self.token_at..self.token_at + self.token_len]
    }

    fn prefix(&self) -> &str {
        &self.raw[..self.token_at]
    }

    fn suffix(&self) -> &str {
        &self.raw[self.token_at + self.token_len..]
    }
}

impl fmt::Display for HostTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
