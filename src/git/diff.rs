//! Parsing for `git diff --numstat` output, used to size the diff caps
//! described for the Lifecycle Manager's worktree diff composition.

/// Line-level diff totals (added/deleted counts) for a single diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct LineDiff {
    pub added: usize,
    pub deleted: usize,
}

/// Parse a single `git diff --numstat` line. Returns `None` for binary
/// entries (`-` counts) and for lines that don't parse as numstat.
pub fn parse_numstat_line(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split('\t');
    let added_str = parts.next()?;
    let deleted_str = parts.next()?;

    if added_str == "-" || deleted_str == "-" {
        return None;
    }

    let added = added_str.parse().ok()?;
    let deleted = deleted_str.parse().ok()?;
    Some((added, deleted))
}

impl LineDiff {
    pub fn from_numstat(output: &str) -> Self {
        let mut totals = LineDiff::default();
        for line in output.lines() {
            if let Some((added, deleted)) = parse_numstat_line(line) {
                totals.added += added;
                totals.deleted += deleted;
            }
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.deleted == 0
    }
}

impl From<LineDiff> for (usize, usize) {
    fn from(diff: LineDiff) -> Self {
        (diff.added, diff.deleted)
    }
}

impl From<(usize, usize)> for LineDiff {
    fn from(value: (usize, usize)) -> Self {
        Self {
            added: value.0,
            deleted: value.1,
        }
    }
}

/// Diff statistics (files changed, insertions, deletions) for a composed
/// worktree diff.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DiffStats {
    pub files: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStats {
    pub fn from_numstat(output: &str) -> Self {
        let mut stats = Self::default();
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some((added, deleted)) = parse_numstat_line(line) {
                stats.files += 1;
                stats.insertions += added;
                stats.deletions += deleted;
            } else {
                // Binary file ("-\t-\tfilename"): counted, no line stats.
                stats.files += 1;
            }
        }
        stats
    }

    /// Human-readable summary parts (e.g. `["3 files", "+45", "-12"]`), zero
    /// values omitted.
    pub fn format_summary(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if self.files > 0 {
            let s = if self.files == 1 { "" } else { "s" };
            parts.push(format!("{} file{}", self.files, s));
        }
        if self.insertions > 0 {
            parts.push(format!("+{}", self.insertions));
        }
        if self.deletions > 0 {
            parts.push(format!("-{}", self.deletions));
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_diff_from_numstat_sums_files() {
        let output = "10\t5\tsrc/main.rs\n20\t3\tsrc/lib.rs\n1\t0\tCargo.toml";
        let result = LineDiff::from_numstat(output);
        assert_eq!(result.added, 31);
        assert_eq!(result.deleted, 8);
    }

    #[test]
    fn line_diff_from_numstat_skips_binary() {
        let output = "10\t5\tsrc/main.rs\n-\t-\timage.png\n3\t2\tREADME.md";
        let result = LineDiff::from_numstat(output);
        assert_eq!(result.added, 13);
        assert_eq!(result.deleted, 7);
    }

    #[test]
    fn line_diff_round_trips_through_tuple() {
        let diff: LineDiff = (10, 5).into();
        let tuple: (usize, usize) = diff.into();
        assert_eq!(tuple, (10, 5));
    }

    #[test]
    fn parse_numstat_line_handles_binary() {
        assert_eq!(parse_numstat_line("-\t-\timage.png"), None);
    }

    #[test]
    fn parse_numstat_line_rejects_non_numstat() {
        assert_eq!(parse_numstat_line("regular text"), None);
        assert_eq!(parse_numstat_line(""), None);
    }

    #[test]
    fn diff_stats_counts_binary_as_file_without_lines() {
        let stats = DiffStats::from_numstat("-\t-\timage.png");
        assert_eq!(stats.files, 1);
        assert_eq!(stats.insertions, 0);
        assert_eq!(stats.deletions, 0);
    }

    #[test]
    fn diff_stats_format_summary_all_parts() {
        let stats = DiffStats {
            files: 3,
            insertions: 45,
            deletions: 12,
        };
        let summary = stats.format_summary();
        assert_eq!(summary, vec!["3 files", "+45", "-12"]);
    }

    #[test]
    fn diff_stats_format_summary_omits_zeros() {
        let stats = DiffStats {
            files: 1,
            insertions: 10,
            deletions: 0,
        };
        assert_eq!(stats.format_summary(), vec!["1 file", "+10"]);
    }
}
