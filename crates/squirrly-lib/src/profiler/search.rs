//! Artifact file matching and the remote search/stat commands
//!
//! The profiler names its output `<resource>_<MODE>_<yyyy-MM-dd_HH_mm_ss>.html`.
//! A strict match requires the run's date right after the mode; the loose
//! fallback accepts any HTML file mentioning the mode, which absorbs clock
//! skew and naming drift at the cost of possibly picking an older file.

use crate::exec::{parse_byte_count, shell};
use crate::models::{ProfilerMode, ProfilingRun};
use chrono::{DateTime, TimeZone, Utc};

const SEARCH_SCRIPT: &str = r#"pattern="$1"; shift
for dir in "$@"; do
  [ -d "$dir" ] && find "$dir" -type f -name "$pattern" 2>/dev/null
done
exit 0"#;

const STAT_SCRIPT: &str = r#"stat -c '%s %Y' "$1" 2>/dev/null || stat -f '%z %m' "$1""#;

/// File-name patterns for one profiling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
    mode: ProfilerMode,
    date_stamp: String,
}

/// The file chosen on one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub matches_run: bool,
}

impl ArtifactPattern {
    pub fn new(mode: ProfilerMode, date_stamp: impl Into<String>) -> Self {
        Self {
            mode,
            date_stamp: date_stamp.into(),
        }
    }

    pub fn for_run(run: &ProfilingRun) -> Self {
        Self::new(run.mode, run.date_stamp())
    }

    /// `*{mode}_{date}_*.html`
    pub fn strict_glob(&self) -> String {
        format!("*{}_{}_*.html", self.mode, self.date_stamp)
    }

    /// `*{mode}*.html`
    pub fn loose_glob(&self) -> String {
        format!("*{}*.html", self.mode)
    }

    pub fn matches_strict(&self, file_name: &str) -> bool {
        file_name.ends_with(".html")
            && file_name.contains(&format!("{}_{}_", self.mode, self.date_stamp))
    }

    pub fn matches_loose(&self, file_name: &str) -> bool {
        file_name.ends_with(".html") && file_name.contains(self.mode.as_str())
    }

    /// The "matches this run" flag: the date literally appears in the name
    pub fn matches_run(&self, file_name: &str) -> bool {
        file_name.contains(&self.date_stamp)
    }

    /// Remote command listing every loose match under `search_paths`.
    ///
    /// The strict pattern is a subset of the loose one, so one listing
    /// serves both passes.
    pub fn search_command(&self, search_paths: &[String]) -> Vec<String> {
        let mut args = vec![self.loose_glob()];
        args.extend(search_paths.iter().cloned());
        shell(SEARCH_SCRIPT, args)
    }

    /// Pick the candidate from one worker's listing.
    ///
    /// Strict matches take precedence over loose ones; within a pass the
    /// lexicographically greatest file name wins, which for these
    /// timestamp-embedded names is the most recent file.
    pub fn select_candidate(&self, listing: &str) -> Option<Candidate> {
        let files: Vec<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|path| self.matches_loose(file_name(path)))
            .collect();

        let strict: Vec<&str> = files
            .iter()
            .copied()
            .filter(|path| self.matches_strict(file_name(path)))
            .collect();

        let pool = if strict.is_empty() { files } else { strict };
        pool.into_iter()
            .max_by(|a, b| file_name(a).cmp(file_name(b)).then_with(|| a.cmp(b)))
            .map(|path| Candidate {
                path: path.to_string(),
                matches_run: self.matches_run(file_name(path)),
            })
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Size and modification time, tolerating GNU and BSD `stat`
pub fn stat_command(path: &str) -> Vec<String> {
    shell(STAT_SCRIPT, [path])
}

/// Parse `<size> <epoch-seconds>` printed by [`stat_command`]
pub fn parse_stat(output: &str) -> Option<(u64, Option<DateTime<Utc>>)> {
    let size = parse_byte_count(output)?;
    let modified = output
        .split_whitespace()
        .nth(1)
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    Some((size, modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> ArtifactPattern {
        ArtifactPattern::new(ProfilerMode::Itimer, "2024-01-01")
    }

    #[test]
    fn test_globs() {
        let p = pattern();
        assert_eq!(p.strict_glob(), "*ITIMER_2024-01-01_*.html");
        assert_eq!(p.loose_glob(), "*ITIMER*.html");
    }

    #[test]
    fn test_strict_and_loose_matching() {
        let p = pattern();
        assert!(p.matches_strict("tm-1_ITIMER_2024-01-01_12_00_00.html"));
        assert!(!p.matches_strict("tm-1_ITIMER_2023-12-31_23_59_59.html"));
        assert!(p.matches_loose("tm-1_ITIMER_2023-12-31_23_59_59.html"));
        assert!(!p.matches_loose("tm-1_CPU_2024-01-01_12_00_00.html"));
        assert!(!p.matches_loose("tm-1_ITIMER_2024-01-01_12_00_00.collapsed"));
    }

    #[test]
    fn test_select_prefers_strict_match() {
        let listing = "\
/tmp/tm_ITIMER_2024-01-01_10_00_00.html
/tmp/tm_ITIMER_2099-12-31_00_00_00.html
/opt/flink/log/tm_ITIMER_2024-01-01_12_00_00.html
";
        let candidate = pattern().select_candidate(listing).unwrap();
        assert_eq!(
            candidate.path,
            "/opt/flink/log/tm_ITIMER_2024-01-01_12_00_00.html"
        );
        assert!(candidate.matches_run);
    }

    #[test]
    fn test_select_falls_back_to_most_recent_loose_match() {
        let listing = "\
/tmp/tm_ITIMER_2023-12-30_08_00_00.html
/tmp/tm_ITIMER_2023-12-31_09_00_00.html
/tmp/tm_CPU_2024-01-01_09_00_00.html
";
        let candidate = pattern().select_candidate(listing).unwrap();
        assert_eq!(candidate.path, "/tmp/tm_ITIMER_2023-12-31_09_00_00.html");
        assert!(!candidate.matches_run);
    }

    #[test]
    fn test_select_nothing() {
        assert_eq!(pattern().select_candidate(""), None);
        assert_eq!(pattern().select_candidate("/tmp/notes.txt\n"), None);
    }

    #[test]
    fn test_search_command_passes_paths_as_arguments() {
        let paths = vec!["/tmp".to_string(), "/opt/flink/log".to_string()];
        let argv = pattern().search_command(&paths);
        assert_eq!(&argv[..2], &["sh".to_string(), "-c".to_string()]);
        assert_eq!(&argv[4..], &["*ITIMER*.html", "/tmp", "/opt/flink/log"]);
    }

    #[test]
    fn test_parse_stat() {
        let (size, modified) = parse_stat("2048 1704110400\n").unwrap();
        assert_eq!(size, 2048);
        assert_eq!(
            modified,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );

        assert_eq!(parse_stat("512"), Some((512, None)));
        assert_eq!(parse_stat("stat: cannot stat"), None);
    }
}
