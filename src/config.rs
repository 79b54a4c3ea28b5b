use std::path::PathBuf;
use std::str::FromStr;

use crate::error::HuntError;

pub const DEFAULT_LABEL: &str = "JOBS/Inbound";
pub const DEFAULT_DAYS: u32 = 60;
pub const DEFAULT_MAX_RESULTS: usize = 50;
/// Messages without a URL need at least this many subject characters to be kept.
pub const DEFAULT_MIN_SUBJECT_LEN: usize = 6;

/// Where job rows are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocator {
    /// `sqlite:<path>`; an empty path means the per-user data directory.
    Sqlite(PathBuf),
    /// `sheets:<spreadsheet-id>`
    Sheets(String),
}

impl FromStr for StoreLocator {
    type Err = HuntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| HuntError::InvalidLocator {
            kind: "store",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        match s.trim().split_once(':') {
            Some(("sqlite", path)) => {
                let path = path.trim();
                if path.is_empty() {
                    Ok(StoreLocator::Sqlite(crate::db::SqliteStore::default_path()))
                } else {
                    Ok(StoreLocator::Sqlite(expand_home(path)))
                }
            }
            Some(("sheets", id)) if !id.trim().is_empty() => {
                Ok(StoreLocator::Sheets(id.trim().to_string()))
            }
            Some(("sheets", _)) => Err(invalid("missing spreadsheet id")),
            _ => Err(invalid("expected sqlite:<path> or sheets:<spreadsheet-id>")),
        }
    }
}

/// Where candidate emails come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// `imap:<username>`
    Imap { username: String },
    /// `gmail:<user>`, usually `gmail:me`
    Gmail { user: String },
    /// `dir:<path>` holding `.eml` files
    Dir(PathBuf),
}

impl FromStr for SourceLocator {
    type Err = HuntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| HuntError::InvalidLocator {
            kind: "source",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (kind, rest) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected imap:<user>, gmail:<user> or dir:<path>"))?;
        let rest = rest.trim();
        match kind {
            "imap" if !rest.is_empty() => Ok(SourceLocator::Imap {
                username: rest.to_string(),
            }),
            "gmail" => Ok(SourceLocator::Gmail {
                user: if rest.is_empty() { "me" } else { rest }.to_string(),
            }),
            "dir" if !rest.is_empty() => Ok(SourceLocator::Dir(expand_home(rest))),
            "imap" | "dir" => Err(invalid("missing value after ':'")),
            _ => Err(invalid("expected imap:<user>, gmail:<user> or dir:<path>")),
        }
    }
}

/// Picks the store from `--store`/`HUNT_STORE`, falling back to `SHEET_ID`.
pub fn resolve_store(store: Option<&str>, sheet_id: Option<&str>) -> Result<StoreLocator, HuntError> {
    match (store.map(str::trim), sheet_id.map(str::trim)) {
        (Some(store), _) if !store.is_empty() => store.parse(),
        (_, Some(id)) if !id.is_empty() => Ok(StoreLocator::Sheets(id.to_string())),
        _ => Err(HuntError::MissingStore),
    }
}

pub fn resolve_source(source: Option<&str>) -> Result<SourceLocator, HuntError> {
    match source.map(str::trim) {
        Some(source) if !source.is_empty() => source.parse(),
        _ => Err(HuntError::MissingSource),
    }
}

/// `<data dir>/seen_ids.json`, next to the default database.
pub fn default_seen_file() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hunt") {
        proj_dirs.data_dir().join("seen_ids.json")
    } else {
        PathBuf::from("state/seen_ids.json")
    }
}

/// Expands a leading `~/` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_locators() {
        assert_eq!(
            "sqlite:/tmp/jobs.db".parse::<StoreLocator>().unwrap(),
            StoreLocator::Sqlite(PathBuf::from("/tmp/jobs.db"))
        );
        assert_eq!(
            "sheets:1EqWPiHd".parse::<StoreLocator>().unwrap(),
            StoreLocator::Sheets("1EqWPiHd".to_string())
        );
        assert!(matches!(
            "sqlite:".parse::<StoreLocator>().unwrap(),
            StoreLocator::Sqlite(_)
        ));
        assert!("sheets:".parse::<StoreLocator>().is_err());
        assert!("postgres://x".parse::<StoreLocator>().is_err());
    }

    #[test]
    fn test_source_locators() {
        assert_eq!(
            "imap:me@example.com".parse::<SourceLocator>().unwrap(),
            SourceLocator::Imap {
                username: "me@example.com".to_string()
            }
        );
        assert_eq!(
            "gmail:".parse::<SourceLocator>().unwrap(),
            SourceLocator::Gmail {
                user: "me".to_string()
            }
        );
        assert_eq!(
            "dir:./mail".parse::<SourceLocator>().unwrap(),
            SourceLocator::Dir(PathBuf::from("./mail"))
        );
        assert!("imap:".parse::<SourceLocator>().is_err());
        assert!("pop3:x".parse::<SourceLocator>().is_err());
        assert!("nothing".parse::<SourceLocator>().is_err());
    }

    #[test]
    fn test_missing_identifiers_are_config_errors() {
        assert!(matches!(resolve_store(None, None), Err(HuntError::MissingStore)));
        assert!(matches!(resolve_store(Some("  "), Some("")), Err(HuntError::MissingStore)));
        assert!(matches!(resolve_source(None), Err(HuntError::MissingSource)));
    }

    #[test]
    fn test_sheet_id_fallback() {
        assert_eq!(
            resolve_store(None, Some("abc")).unwrap(),
            StoreLocator::Sheets("abc".to_string())
        );
        assert_eq!(
            resolve_store(Some("sqlite:x.db"), Some("abc")).unwrap(),
            StoreLocator::Sqlite(PathBuf::from("x.db"))
        );
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/etc/x"), PathBuf::from("/etc/x"));
        assert!(!expand_home("~/x").starts_with("~"));
    }
}
