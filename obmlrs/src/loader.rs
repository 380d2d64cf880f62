//! YAML safety pre-checks the model registry runs before handing raw text to
//! `serde_yaml`: document size, anchor/alias rejection, node count and
//! nesting depth caps.
//!
//! Grounded in `original_source/src/orionbelt/parser/loader.py`'s
//! `TrackedLoader`: `_MAX_DOCUMENT_SIZE`/`_ANCHOR_RE`/`_MAX_NODE_COUNT`/
//! `_MAX_DEPTH`. OBML models are meant to be flat, literal documents -- any
//! anchor or alias marker is a safety violation here, not a feature to
//! resolve.

use crate::config::YamlSafetyConfig;
use crate::error::{ObmlError, Result};

pub fn check_yaml_safety(raw: &str, limits: &YamlSafetyConfig) -> Result<()> {
    if raw.len() > limits.max_document_size {
        return Err(ObmlError::YamlSafety(format!(
            "document size {} bytes exceeds the {} byte limit",
            raw.len(),
            limits.max_document_size
        )));
    }
    if let Some(line) = find_anchor_or_alias(raw) {
        return Err(ObmlError::YamlSafety(format!(
            "YAML anchors and aliases are not permitted (found near '{}')",
            line.trim()
        )));
    }

    let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
    let mut node_count = 0usize;
    let depth = count_nodes(&value, 0, &mut node_count);
    if node_count > limits.max_node_count {
        return Err(ObmlError::YamlSafety(format!(
            "document has {node_count} nodes, exceeding the {} node limit",
            limits.max_node_count
        )));
    }
    if depth > limits.max_depth {
        return Err(ObmlError::YamlSafety(format!(
            "document nests {depth} levels deep, exceeding the {} level limit",
            limits.max_depth
        )));
    }
    Ok(())
}

/// A line-oriented scan for YAML anchor (`&name`) and alias (`*name`)
/// markers at a value position, outside comments. Good enough to catch the
/// common forms without pulling in a full tokenizer -- OBML documents have
/// no legitimate use for either construct.
fn find_anchor_or_alias(raw: &str) -> Option<&str> {
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.is_empty() {
            continue;
        }
        let value_part = trimmed.strip_prefix("- ").unwrap_or(trimmed);
        let candidate = match value_part.split_once(": ") {
            Some((_, v)) => v.trim_start(),
            None => value_part,
        };
        let marker = candidate
            .strip_prefix('&')
            .or_else(|| candidate.strip_prefix('*'));
        if let Some(rest) = marker {
            let is_marker = rest
                .chars()
                .next()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);
            if is_marker {
                return Some(line);
            }
        }
    }
    None
}

fn count_nodes(value: &serde_yaml::Value, depth: usize, node_count: &mut usize) -> usize {
    *node_count += 1;
    match value {
        serde_yaml::Value::Mapping(m) => m
            .iter()
            .map(|(k, v)| {
                count_nodes(k, depth + 1, node_count).max(count_nodes(v, depth + 1, node_count))
            })
            .max()
            .unwrap_or(depth),
        serde_yaml::Value::Sequence(s) => s
            .iter()
            .map(|v| count_nodes(v, depth + 1, node_count))
            .max()
            .unwrap_or(depth),
        _ => depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> YamlSafetyConfig {
        YamlSafetyConfig {
            max_document_size: 5_000_000,
            max_node_count: 50_000,
            max_depth: 20,
        }
    }

    #[test]
    fn accepts_plain_document() {
        let yaml = "a: 1\nb:\n  - 2\n  - 3\n";
        assert!(check_yaml_safety(yaml, &limits()).is_ok());
    }

    #[test]
    fn rejects_anchor() {
        let yaml = "a: &anchor 1\nb: 2\n";
        assert!(check_yaml_safety(yaml, &limits()).is_err());
    }

    #[test]
    fn rejects_alias() {
        let yaml = "a: &anchor 1\nb: *anchor\n";
        assert!(check_yaml_safety(yaml, &limits()).is_err());
    }

    #[test]
    fn rejects_oversized_document() {
        let tiny = YamlSafetyConfig {
            max_document_size: 4,
            max_node_count: 50_000,
            max_depth: 20,
        };
        assert!(check_yaml_safety("a: 1\n", &tiny).is_err());
    }

    #[test]
    fn rejects_excessive_depth() {
        let shallow = YamlSafetyConfig {
            max_document_size: 5_000_000,
            max_node_count: 50_000,
            max_depth: 1,
        };
        let yaml = "a:\n  b:\n    c: 1\n";
        assert!(check_yaml_safety(yaml, &shallow).is_err());
    }
}
