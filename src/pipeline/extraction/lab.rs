//! Line-oriented lab-panel scanner.

use regex::Regex;

use super::types::LabResultRow;

/// A known test name matched as a whole word.
#[derive(Debug, Clone)]
pub struct LabTest {
    pub key: &'static str,
    pub display: &'static str,
    pattern: Regex,
}

impl LabTest {
    pub fn new(key: &'static str, display: &'static str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(key)))?;
        Ok(Self { key, display, pattern })
    }
}

#[derive(Debug, Clone)]
pub struct LabVocabulary {
    /// Checked in order; the first test named on a line claims it.
    pub tests: Vec<LabTest>,
    /// Number with an optional unit right after it.
    pub value: Regex,
    /// Parenthesized `low-high` reference range.
    pub range: Regex,
    /// Tokens that flag a result as out of range.
    pub abnormal_markers: Vec<&'static str>,
}

impl LabVocabulary {
    /// Scan `text` line by line; at most one row per line.
    pub fn scan(&self, text: &str) -> Vec<LabResultRow> {
        text.lines().filter_map(|line| self.scan_line(line)).collect()
    }

    fn scan_line(&self, line: &str) -> Option<LabResultRow> {
        let (test, hit) = self
            .tests
            .iter()
            .find_map(|t| t.pattern.find(line).map(|m| (t, m)))?;

        let rest = &line[hit.end()..];
        let caps = self.value.captures(rest)?;
        let value = caps.get(1)?.as_str().to_string();
        let unit = caps
            .get(2)
            .map(|m| m.as_str().trim_end_matches(['.', ':']))
            .filter(|u| !u.is_empty() && !self.is_marker(u))
            .map(str::to_string);

        let after_value = &rest[caps.get(0).map_or(0, |m| m.end())..];
        let reference_range = self
            .range
            .captures(after_value)
            .map(|r| format!("{}-{}", &r[1], &r[2]));

        Some(LabResultRow {
            test_name: test.display.to_string(),
            value,
            unit,
            reference_range,
            abnormal: self.is_flagged(line),
        })
    }

    fn is_marker(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.abnormal_markers.iter().any(|m| *m == lower)
    }

    /// A marker anywhere on the line flags the row.
    fn is_flagged(&self, line: &str) -> bool {
        line.split_whitespace().any(|token| {
            let trimmed = token.trim_matches(|c: char| "()[],;:.".contains(c));
            self.is_marker(trimmed) || (trimmed.len() > 1 && trimmed.ends_with('*'))
        })
    }
}
