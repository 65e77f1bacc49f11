//! Developer attribution via git blame.
//!
//! Maps findings to the author of their line using one
//! `git blame --line-porcelain` subprocess per file, then aggregates per
//! author and (through an externally supplied author→team map) per team.
//! Non-repo targets and missing blame data yield empty attribution without
//! failing the analysis.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One finding's location, as supplied by the caller.
pub type FindingLocation = (String, Option<i64>);

/// Aggregated attribution result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeveloperAttribution {
    pub by_author: BTreeMap<String, usize>,
    pub by_team: BTreeMap<String, usize>,
    /// Findings that could not be mapped to an author.
    pub unattributed: usize,
}

/// Attribute findings to authors and teams.
pub fn attribute_findings(
    repo: &Path,
    findings: &[FindingLocation],
    team_map: &BTreeMap<String, String>,
) -> DeveloperAttribution {
    let mut attribution = DeveloperAttribution::default();
    let mut blame_cache: HashMap<String, Option<HashMap<i64, String>>> = HashMap::new();

    for (path, start_line) in findings {
        let authors = blame_cache
            .entry(path.clone())
            .or_insert_with(|| blame_file(repo, path));

        let author = match (authors.as_ref(), start_line) {
            (Some(lines), Some(line)) => lines.get(line).cloned(),
            _ => None,
        };

        match author {
            Some(author) => {
                if let Some(team) = team_map.get(&author) {
                    *attribution.by_team.entry(team.clone()).or_insert(0) += 1;
                }
                *attribution.by_author.entry(author).or_insert(0) += 1;
            }
            None => attribution.unattributed += 1,
        }
    }
    attribution
}

/// Blame one file, returning a line → author map. `None` when blame is
/// unavailable (not a repo, file untracked, git missing).
fn blame_file(repo: &Path, path: &str) -> Option<HashMap<i64, String>> {
    let output = Command::new("git")
        .args(["blame", "--line-porcelain", "--", path])
        .current_dir(repo)
        .output()
        .ok()?;
    if !output.status.success() {
        debug!(path, "git blame failed; finding stays unattributed");
        return None;
    }
    Some(parse_line_porcelain(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `--line-porcelain` output: each line group starts with
/// `<sha> <orig-line> <final-line> [<group-size>]` and repeats full
/// metadata, including an `author ` record.
fn parse_line_porcelain(text: &str) -> HashMap<i64, String> {
    let mut authors = HashMap::new();
    let mut current_line: Option<i64> = None;

    for line in text.lines() {
        if let Some(header_line) = parse_header(line) {
            current_line = Some(header_line);
        } else if let Some(author) = line.strip_prefix("author ") {
            if let Some(final_line) = current_line {
                authors.insert(final_line, author.trim().to_string());
            }
        }
    }
    authors
}

/// Header lines are `<40-hex sha> <orig> <final> [<count>]`.
fn parse_header(line: &str) -> Option<i64> {
    let mut parts = line.split(' ');
    let sha = parts.next()?;
    if sha.len() != 40 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let _orig: i64 = parts.next()?.parse().ok()?;
    parts.next()?.parse().ok()
}
