//! Reader for the node identifiers file.
//!
//! One node per line, as `host[:port],user,password`. Blank lines and lines
//! starting with `#` are skipped.

use anyhow::{Context, Result};
use std::{fmt, fs, path::Path};
use tracing::{debug, warn};

/// One line of the identifiers file
#[derive(Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEntry")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Reads and parses the identifiers file at `path`
pub fn read_identifiers(path: &Path) -> Result<Vec<NodeEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read identifiers file {}", path.display()))?;
    let entries = parse_identifiers(&content);
    debug!(file = %path.display(), nodes = entries.len(), "Identifiers loaded");
    Ok(entries)
}

/// Parses identifiers content, warning about and skipping malformed lines
pub fn parse_identifiers(content: &str) -> Vec<NodeEntry> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let entry = parse_line(line);
            if entry.is_none() {
                warn!(line = index + 1, "Malformed identifiers line, skipping");
            }
            entry
        })
        .collect()
}

fn parse_line(line: &str) -> Option<NodeEntry> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [host, user, password] = fields.as_slice() else {
        return None;
    };
    if host.is_empty() {
        return None;
    }
    Some(NodeEntry {
        host: host.to_string(),
        user: user.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "# salon\n192.168.1.20:9090,kodi,secret\n\n   \n  cuisine , kodi , pass  \n";
        let entries = parse_identifiers(content);
        assert_eq!(
            entries,
            vec![
                NodeEntry {
                    host: "192.168.1.20:9090".into(),
                    user: "kodi".into(),
                    password: "secret".into(),
                },
                NodeEntry {
                    host: "cuisine".into(),
                    user: "kodi".into(),
                    password: "pass".into(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let content = "only-host\na,b\n,kodi,kodi\na,b,c,d\nok:9090,kodi,\n";
        let entries = parse_identifiers(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].host, "ok:9090");
        assert_eq!(entries[0].password, "");
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identifiers");
        fs::write(&path, "bureau:8080,admin,admin\n").unwrap();

        let entries = read_identifiers(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user, "admin");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_identifiers(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let entry = NodeEntry {
            host: "h".into(),
            user: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{entry:?}").contains("hunter2"));
    }
}
