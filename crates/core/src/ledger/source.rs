//! Seed script parsing: one job per line, `key|text`.

use std::collections::HashSet;
use tracing::warn;

use super::types::Job;

/// Outcome of parsing a seed script.
#[derive(Debug)]
pub struct ParsedSource {
    pub jobs: Vec<Job>,
    pub skipped: usize,
}

/// Parse a line-oriented `key|text` source into pending jobs.
///
/// Ids are assigned 1..n over the valid lines in file order. Blank lines are
/// ignored; lines with the wrong field count, an empty key or text, or a
/// duplicate key are skipped with a warning and do not consume an id.
pub fn parse_source(content: &str) -> ParsedSource {
    let mut jobs = Vec::new();
    let mut skipped = 0;
    let mut seen_keys: HashSet<String> = HashSet::new();

    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 2 {
            warn!(
                line = line_no + 1,
                fields = parts.len(),
                "Skipping malformed source line (expected key|text)"
            );
            skipped += 1;
            continue;
        }

        let key = parts[0].trim();
        let text = parts[1].trim();
        if key.is_empty() || text.is_empty() {
            warn!(line = line_no + 1, "Skipping source line with empty field");
            skipped += 1;
            continue;
        }

        if !seen_keys.insert(key.to_string()) {
            warn!(line = line_no + 1, key, "Skipping duplicate source key");
            skipped += 1;
            continue;
        }

        let filename = if key.ends_with(".wav") {
            key.to_string()
        } else {
            format!("{key}.wav")
        };

        let id = jobs.len() as u64 + 1;
        jobs.push(Job::new(id, filename, text.to_string()));
    }

    ParsedSource { jobs, skipped }
}
