//! Security guard — path confinement and command blacklist.
//!
//! A pure check layer: construct once from config, then call
//! `check_file_path` / `check_working_dir` before any filesystem access and
//! `check_command` before any process spawn. Stateless after construction.

use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::warn;

use crate::error::SandboxDenied;
use crate::utils;

/// Command patterns that are always blocked (case-insensitive regexes).
///
/// Covers recursive deletion, disk formatting, system lifecycle, fork
/// bombs, piping remote scripts into a shell, privilege escalation, forced
/// kills, crontab wipes, LD_PRELOAD injection, and kernel-module ops.
const DEFAULT_DENY_PATTERNS: &[&str] = &[
    r"\brm\s+(-[a-z]*[rf][a-z]*\s+)+",
    r"\bdel\s+/[fq]\b",
    r"\brmdir\s+/s\b",
    r"\bmkfs(\.\w+)?\b",
    r"\bformat\s+[a-z]:",
    r"\bdd\s+if=",
    r">\s*/dev/sd[a-z]",
    r"\b(shutdown|reboot|poweroff|halt)\b",
    r":\(\)\s*\{.*\};\s*:",
    r"\b(curl|wget)\b[^|]*\|\s*(ba|z|da)?sh\b",
    r"\bsudo\b",
    r"\bsu\s+(-|\w+)",
    r"\bkillall\s+(-\w+\s+)*-9\b",
    r"\bpkill\s+(-\w+\s+)*-9\b",
    r"\bcrontab\s+-r\b",
    r"\bexport\s+LD_PRELOAD\b",
    r"\b(insmod|rmmod|modprobe)\b",
];

/// Path confinement + command blacklist for side-effecting tools.
pub struct SecurityGuard {
    /// Normalized workspace root; `None` disables path confinement.
    workspace_root: Option<PathBuf>,
    /// Compiled deny patterns (built once at construction).
    deny: Vec<regex::Regex>,
}

impl SecurityGuard {
    /// Create a guard.
    ///
    /// `workspace_root = Some(dir)` confines file paths and working
    /// directories to descendants of `dir`. A `custom_blacklist` fully
    /// replaces the default command patterns; individual patterns that fail
    /// to compile are logged and skipped.
    pub fn new(workspace_root: Option<PathBuf>, custom_blacklist: Option<&[String]>) -> Self {
        let patterns: Vec<String> = match custom_blacklist {
            Some(list) => list.to_vec(),
            None => DEFAULT_DENY_PATTERNS.iter().map(|s| s.to_string()).collect(),
        };

        let deny = patterns
            .iter()
            .filter_map(|p| {
                match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(pattern = %p, error = %e, "skipping unparsable deny pattern");
                        None
                    }
                }
            })
            .collect();

        let workspace_root = workspace_root.map(|p| normalize(&p));

        Self {
            workspace_root,
            deny,
        }
    }

    /// Whether path confinement is active.
    pub fn confined(&self) -> bool {
        self.workspace_root.is_some()
    }

    /// Check a user-supplied file path.
    ///
    /// Expands `~`, resolves symlinks, and — when confinement is on —
    /// requires the result to be a descendant of the workspace root.
    /// Returns the resolved path for the caller to use.
    pub fn check_file_path(&self, path: &str) -> Result<PathBuf, SandboxDenied> {
        let resolved = normalize(&utils::expand_home(path));

        if let Some(root) = &self.workspace_root {
            if !resolved.starts_with(root) {
                return Err(SandboxDenied(format!(
                    "path '{}' is outside the workspace '{}'",
                    resolved.display(),
                    root.display()
                )));
            }
        }

        Ok(resolved)
    }

    /// Check a working directory for command execution. Same confinement
    /// rule as file paths.
    pub fn check_working_dir(&self, dir: &Path) -> Result<PathBuf, SandboxDenied> {
        self.check_file_path(&dir.to_string_lossy())
    }

    /// Check a shell command against the blacklist.
    ///
    /// Returns the offending pattern inside the error on a match.
    pub fn check_command(&self, command: &str) -> Result<(), SandboxDenied> {
        for re in &self.deny {
            if re.is_match(command) {
                warn!(command = %command, pattern = %re.as_str(), "command blocked");
                return Err(SandboxDenied(format!(
                    "command matches blocked pattern '{}'",
                    re.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Resolve a path to an absolute, symlink-normalized form.
///
/// Non-existent files (e.g. a write target) normalize through the nearest
/// existing ancestor so `..` segments and symlinks can't escape.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(canon_parent) = parent.canonicalize() {
            return canon_parent.join(name);
        }
    }

    path.to_path_buf()
}
