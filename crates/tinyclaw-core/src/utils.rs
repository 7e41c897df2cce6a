//! Utility helpers — path resolution, timestamps, string manipulation.

use std::path::PathBuf;

/// Get the TinyClaw data directory (e.g. `~/.tinyclaw/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".tinyclaw")
}

/// Get the default workspace path (e.g. `~/.tinyclaw/workspace/`).
pub fn get_default_workspace_path() -> PathBuf {
    get_data_path().join("workspace")
}

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Get current ISO 8601 timestamp.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Truncate a string to `max_len` characters, appending an ellipsis marker
/// when content was cut. Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Sanitize a string for use as a filename.
///
/// Session keys contain `:`, which is illegal on some filesystems; every
/// byte outside `[A-Za-z0-9._-]` maps to `_`. The mapping is stable so a
/// key always resolves to the same file.
pub fn safe_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        let result = truncate_string("hello world, this is a long string", 15);
        assert_eq!(result, "hello world,...");
    }

    #[test]
    fn test_truncate_unicode() {
        let result = truncate_string("こんにちは世界です", 5);
        assert_eq!(result, "こん...");
    }

    #[test]
    fn test_safe_filename_escapes_colon() {
        assert_eq!(safe_filename("cli:default"), "cli_default");
        assert_eq!(safe_filename("web:sid-42"), "web_sid-42");
    }

    #[test]
    fn test_safe_filename_stable() {
        assert_eq!(safe_filename("a/b\\c:d"), safe_filename("a/b\\c:d"));
        assert_eq!(safe_filename("my-file_v2.txt"), "my-file_v2.txt");
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/notes");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("notes"));
    }

    #[test]
    fn test_expand_home_absolute_untouched() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_data_path_ends_with_tinyclaw() {
        assert!(get_data_path().ends_with(".tinyclaw"));
    }

    #[test]
    fn test_now_ms_positive() {
        assert!(now_ms() > 1_600_000_000_000);
    }

    #[test]
    fn test_timestamp_is_valid_rfc3339() {
        chrono::DateTime::parse_from_rfc3339(&timestamp()).unwrap();
    }
}
