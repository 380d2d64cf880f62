//! Structured diagnostics shared by the resolver, validator and query resolver.
//!
//! Every stage that can fail for more than one reason at once accumulates a
//! `Vec<Diagnostic>` instead of bailing on the first problem, so a caller can
//! see every broken reference or cyclic join in one pass.

use std::fmt;

/// A single structured error or warning.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub path: Option<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            suggestions: Vec::new(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn suggest(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (at {path})")?;
        }
        if !self.suggestions.is_empty() {
            write!(f, " -- did you mean: {}?", self.suggestions.join(", "))?;
        }
        Ok(())
    }
}

/// An accumulated batch of diagnostics, used as an error type in its own right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result<T>(self, ok: T) -> Result<T, Diagnostics> {
        if self.is_empty() {
            Ok(ok)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Cheap best-effort spelling suggestions for "did you mean" errors.
/// Not a general-purpose fuzzy matcher -- ranks candidates by a small
/// iterative Levenshtein distance and keeps the closest few.
pub fn suggest(unknown: &str, candidates: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .map(|c| {
            let c = c.as_ref().to_string();
            (levenshtein(unknown, &c), c)
        })
        .filter(|(dist, c)| *dist <= (c.len().max(unknown.len()) / 2).max(2))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(3).map(|(_, c)| c).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cur = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = cur;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_finds_close_typo() {
        let candidates = ["revenue", "refunds", "order_count"];
        let got = suggest("revenu", candidates);
        assert_eq!(got.first().map(String::as_str), Some("revenue"));
    }

    #[test]
    fn suggest_ignores_unrelated_names() {
        let candidates = ["revenue", "refunds"];
        let got = suggest("zzzzzzzzzz", candidates);
        assert!(got.is_empty());
    }
}
