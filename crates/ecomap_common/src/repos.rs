//! Repository discovery
//!
//! Walks configured roots looking for git checkouts. A directory holding a
//! `.git` entry is a repository and is not descended into further.

use crate::types::RepositoryRecord;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How deep below each root a checkout may sit
pub const MAX_DISCOVERY_DEPTH: usize = 4;

const README_CANDIDATES: &[&str] = &["README.md", "README.rst", "README.txt", "README", "readme.md"];

/// Directory names never worth descending into
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "target", "venv"];

/// Find every repository below the given roots, sorted by name then path
pub fn discover_repositories(roots: &[PathBuf]) -> Vec<RepositoryRecord> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut repositories = Vec::new();

    for root in roots {
        if !root.is_dir() {
            warn!("Repository root {} is not a directory, skipping", root.display());
            continue;
        }

        let mut walker = WalkDir::new(root).max_depth(MAX_DISCOVERY_DEPTH).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            if entry.depth() > 0 && is_skipped(dir) {
                walker.skip_current_dir();
                continue;
            }

            if dir.join(".git").exists() {
                let key = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
                if seen.insert(key) {
                    repositories.push(inspect_repository(dir));
                }
                walker.skip_current_dir();
            }
        }
    }

    repositories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    debug!("Discovered {} repositories", repositories.len());
    repositories
}

pub(crate) fn is_skipped(dir: &Path) -> bool {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.') || SKIPPED_DIRS.contains(&name),
        None => false,
    }
}

/// Build a record for one checkout
pub fn inspect_repository(path: &Path) -> RepositoryRecord {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    RepositoryRecord {
        name,
        path: path.to_path_buf(),
        current_branch: current_branch(path),
        description: readme_description(path),
    }
}

/// Branch name from `.git/HEAD`; a short hash when detached
pub fn current_branch(repo: &Path) -> Option<String> {
    let git_dir = resolve_git_dir(repo)?;
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();

    if let Some(reference) = head.strip_prefix("ref:") {
        let reference = reference.trim();
        let branch = reference.strip_prefix("refs/heads/").unwrap_or(reference);
        return Some(branch.to_string()).filter(|b| !b.is_empty());
    }

    if head.len() >= 7 && head.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(head[..7].to_string());
    }
    None
}

/// `.git` may be a directory or a `gitdir:` pointer file (worktrees, submodules)
fn resolve_git_dir(repo: &Path) -> Option<PathBuf> {
    let dot_git = repo.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    let pointer = fs::read_to_string(&dot_git).ok()?;
    let target = pointer.trim().strip_prefix("gitdir:")?.trim();
    let target = PathBuf::from(target);
    Some(if target.is_absolute() { target } else { repo.join(target) })
}

/// First non-blank README line with heading markers removed
pub fn readme_description(repo: &Path) -> Option<String> {
    let text = README_CANDIDATES
        .iter()
        .map(|name| repo.join(name))
        .find(|p| p.is_file())
        .and_then(|p| fs::read_to_string(p).ok())?;

    text.lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
