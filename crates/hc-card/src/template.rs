//! Placeholder substitution for name and shape-path templates.
//!
//! Templates use a fixed token set (`$BIN`, `$PROCESS`, ...) rather than
//! general string formatting, so an unknown token is a hard configuration
//! error instead of silently passing through.

use hc_core::{Error, Result};

/// Token names recognized in templates, without the leading `$`.
pub const TOKENS: [&str; 7] =
    ["ANALYSIS", "BIN", "CHANNEL", "ERA", "MASS", "PROCESS", "SYSTEMATIC"];

/// Values available for substitution in one resolution context.
///
/// A token left at `None` is still *known*; using it in a template where it
/// has no value is a configuration error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tokens<'a> {
    pub analysis: Option<&'a str>,
    pub bin: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub era: Option<&'a str>,
    pub mass: Option<&'a str>,
    pub process: Option<&'a str>,
    pub systematic: Option<&'a str>,
}

impl<'a> Tokens<'a> {
    fn get(&self, token: &str) -> Option<&'a str> {
        match token {
            "ANALYSIS" => self.analysis,
            "BIN" => self.bin,
            "CHANNEL" => self.channel,
            "ERA" => self.era,
            "MASS" => self.mass,
            "PROCESS" => self.process,
            "SYSTEMATIC" => self.systematic,
            _ => None,
        }
    }

    /// Same context with the `$SYSTEMATIC` token bound.
    pub fn with_systematic(mut self, name: &'a str) -> Self {
        self.systematic = Some(name);
        self
    }
}

/// Resolve every `$TOKEN` occurrence in `template` against `tokens`.
///
/// Tokens are matched longest-first, so `$PROCESS` is never misread as a
/// shorter token followed by literal text.
pub fn substitute(template: &str, tokens: &Tokens) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let token = TOKENS
            .iter()
            .copied()
            .filter(|t| after.starts_with(t))
            .max_by_key(|t| t.len())
            .ok_or_else(|| {
                let seen: String =
                    after.chars().take_while(|c| c.is_ascii_uppercase()).collect();
                Error::Configuration(format!(
                    "unknown token '${}' in template '{}'",
                    seen, template
                ))
            })?;

        let value = tokens.get(token).ok_or_else(|| {
            Error::Configuration(format!(
                "token '${}' has no value in this context (template '{}')",
                token, template
            ))
        })?;

        out.push_str(value);
        rest = &after[token.len()..];
    }

    out.push_str(rest);
    Ok(out)
}
