//! Patient-name cascade.
//!
//! Strategies run in order and the first one that produces a name wins.
//! Explicit `First Name:` / `Last Name:` labels are applied afterwards by the
//! engine and override whatever the cascade found.

use regex::Regex;

use super::engine::match_context;
use super::normalize::capitalize_name;

/// How a strategy's captures become a first and last name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameCapture {
    /// Groups 1 and 2 are first and last name.
    Pair,
    /// Group 1 is a full name; first and last tokens are used.
    FullName,
    /// Groups 1 and 2 form an ALL-CAPS line; lines holding an excluded
    /// header word are skipped and the next line is tried.
    HeaderLine,
}

#[derive(Debug, Clone)]
pub struct NameStrategy {
    pub name: &'static str,
    pub regex: Regex,
    pub confidence: f32,
    pub capture: NameCapture,
}

/// A name produced by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub first: String,
    pub last: String,
    pub confidence: f32,
    pub context: String,
    pub strategy: &'static str,
}

impl NameStrategy {
    pub fn new(
        name: &'static str,
        pattern: &str,
        confidence: f32,
        capture: NameCapture,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            confidence,
            capture,
        })
    }

    pub fn try_match(&self, text: &str, exclusions: &[&str]) -> Option<NameMatch> {
        match self.capture {
            NameCapture::Pair => {
                let caps = self.regex.captures(text)?;
                self.build(&caps[0], &caps[1], &caps[2])
            }
            NameCapture::FullName => {
                let caps = self.regex.captures(text)?;
                let tokens: Vec<&str> = caps[1].split_whitespace().collect();
                let (first, last) = (tokens.first()?, tokens.last()?);
                if tokens.len() < 2 {
                    return None;
                }
                self.build(&caps[0], first, last.trim_end_matches('.'))
            }
            NameCapture::HeaderLine => self
                .regex
                .captures_iter(text)
                .find(|caps| {
                    !exclusions.iter().any(|word| {
                        word.eq_ignore_ascii_case(&caps[1]) || word.eq_ignore_ascii_case(&caps[2])
                    })
                })
                .and_then(|caps| self.build(&caps[0], &caps[1], &caps[2])),
        }
    }

    fn build(&self, matched: &str, first: &str, last: &str) -> Option<NameMatch> {
        let first = capitalize_name(first);
        let last = capitalize_name(last);
        if first.is_empty() || last.is_empty() {
            return None;
        }
        Some(NameMatch {
            first,
            last,
            confidence: self.confidence,
            context: match_context(matched),
            strategy: self.name,
        })
    }
}

/// Run the cascade; the first strategy that yields a name wins.
pub fn resolve_name(
    strategies: &[NameStrategy],
    exclusions: &[&str],
    text: &str,
) -> Option<NameMatch> {
    let found = strategies.iter().find_map(|s| s.try_match(text, exclusions));
    if let Some(m) = &found {
        tracing::debug!(strategy = m.strategy, confidence = m.confidence, "Patient name resolved");
    }
    found
}
