//! Result link resolution for finished evals.
//!
//! The eval tool writes each run to `{out_dir}/{eval_name}/{run_id}/`. After
//! the subprocess exits the link is looked up, in order, from:
//!
//! 1. a `run_summary.json` whose `kinfer_file` matches the policy,
//! 2. `notion_url.txt` in the newest run directory,
//! 3. the first `http(s)://` URL in captured stdout, then stderr.
//!
//! Finding nothing is a normal outcome, not an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const NOTION_URL_FILE: &str = "notion_url.txt";

/// The part of `run_summary.json` this bot reads. Other fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    /// Absolute path of the policy the run evaluated.
    #[serde(default)]
    pub kinfer_file: Option<String>,

    #[serde(default)]
    pub notion_url: Option<String>,
}

/// Which strategy produced a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    RunSummary,
    UrlFile,
    Stdout,
    Stderr,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::RunSummary => "run_summary",
            LinkSource::UrlFile => "url_file",
            LinkSource::Stdout => "stdout",
            LinkSource::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: String,
    pub source: LinkSource,
}

/// Resolve the result link for `policy_path` after its eval exited.
pub fn resolve_link(
    out_dir: &Path,
    eval_name: &str,
    policy_path: &Path,
    stdout: &str,
    stderr: &str,
) -> Option<ResolvedLink> {
    let root = out_dir.join(eval_name);

    if let Some(url) = link_from_summaries(&root, policy_path) {
        return Some(ResolvedLink {
            url,
            source: LinkSource::RunSummary,
        });
    }
    if let Some(url) = link_from_latest_url_file(&root) {
        return Some(ResolvedLink {
            url,
            source: LinkSource::UrlFile,
        });
    }
    if let Some(url) = extract_url(stdout) {
        return Some(ResolvedLink {
            url,
            source: LinkSource::Stdout,
        });
    }
    extract_url(stderr).map(|url| ResolvedLink {
        url,
        source: LinkSource::Stderr,
    })
}

/// Scan run summaries newest first for one that evaluated `policy_path`.
pub fn link_from_summaries(root: &Path, policy_path: &Path) -> Option<String> {
    let wanted = absolute_path(policy_path);
    let wanted = wanted.to_string_lossy();

    for dir in run_dirs_newest_first(root) {
        let path = dir.join(RUN_SUMMARY_FILE);
        let summary = match read_summary(&path) {
            Some(summary) => summary,
            None => continue,
        };
        if summary.kinfer_file.as_deref() != Some(&*wanted) {
            continue;
        }
        if let Some(url) = summary.notion_url.filter(|u| !u.trim().is_empty()) {
            return Some(url);
        }
    }
    None
}

/// Trimmed `notion_url.txt` from the most recently modified run directory.
pub fn link_from_latest_url_file(root: &Path) -> Option<String> {
    let latest = run_dirs_newest_first(root).into_iter().next()?;
    let text = fs::read_to_string(latest.join(NOTION_URL_FILE)).ok()?;
    let url = text.trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// First `http://` or `https://` token in `text`.
pub fn extract_url(text: &str) -> Option<String> {
    static URL: OnceLock<Regex> = OnceLock::new();
    let re = URL.get_or_init(|| Regex::new(r"https?://\S+").expect("URL pattern is valid"));
    re.find(text).map(|m| m.as_str().to_string())
}

fn read_summary(path: &Path) -> Option<RunSummary> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(summary) => Some(summary),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable run summary");
            None
        }
    }
}

/// Subdirectories of `root`, most recently modified first.
fn run_dirs_newest_first(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut dirs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_dir().then(|| {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, entry.path())
            })
        })
        .collect();
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    dirs.into_iter().map(|(_, path)| path).collect()
}

fn absolute_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
