//! Filtering policy shared by all backends

use crate::adapters::store::Session;
use crate::config::schema::PathConfig;
use crate::domain::{Attachment, AttachmentRole, Document, EdiError, Result};
use chrono::{DateTime, Duration, Utc};
use globset::{Glob, GlobMatcher};

/// Glob and age window of one path
pub struct PathFilter {
    matcher: GlobMatcher,
    /// Oldest modification (or execution) time still in the window
    pub min_date: DateTime<Utc>,
}

impl PathFilter {
    pub fn new(path: &PathConfig, now: DateTime<Utc>) -> Result<Self> {
        let matcher = Glob::new(&path.glob)
            .map_err(|e| EdiError::Configuration(format!("Invalid glob '{}': {}", path.glob, e)))?
            .compile_matcher();
        let window = Duration::milliseconds((path.age_window * 3_600_000.0) as i64);
        Ok(Self {
            matcher,
            min_date: now - window,
        })
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    pub fn is_recent(&self, modified: DateTime<Utc>) -> bool {
        modified >= self.min_date
    }
}

/// Fails when the received payload does not have the announced size
pub fn check_size(expected: u64, actual: usize) -> Result<()> {
    if expected != actual as u64 {
        return Err(EdiError::user(format!(
            "File size mismatch (expected {} got {})",
            expected, actual
        )));
    }
    Ok(())
}

/// Documents executed within the window, with their outputs matching the glob
///
/// Documents are restricted to the path's document types. Documents without
/// matching outputs are left out.
pub async fn eligible_outputs(
    session: &mut dyn Session,
    path: &PathConfig,
    filter: &PathFilter,
) -> Result<Vec<(Document, Vec<Attachment>)>> {
    let documents = session
        .executed_documents(filter.min_date, &path.doc_types)
        .await?;
    let mut eligible = Vec::new();
    for document in documents {
        let outputs: Vec<Attachment> = session
            .document_attachments(document.id, AttachmentRole::Output)
            .await?
            .into_iter()
            .filter(|a| filter.matches_name(&a.name))
            .collect();
        if !outputs.is_empty() {
            eligible.push((document, outputs));
        }
    }
    Ok(eligible)
}

/// Joins a remote directory and a file name with `/`
pub fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Hidden temporary name used for atomic deposits
pub fn temp_name() -> String {
    format!(".{}~", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("*.txt", "hello_world.txt", true ; "matching extension")]
    #[test_case("*.txt", "hello_world.csv", false ; "other extension")]
    #[test_case("*", "anything", true ; "default glob")]
    #[test_case("ORDERS_*.csv", "ORDERS_001.csv", true ; "prefix")]
    fn test_glob(glob: &str, name: &str, expected: bool) {
        let mut path = PathConfig::new("in", "/tmp");
        path.glob = glob.to_string();
        let filter = PathFilter::new(&path, Utc::now()).unwrap();
        assert_eq!(filter.matches_name(name), expected);
    }

    #[test]
    fn test_age_window() {
        let now = Utc::now();
        let mut path = PathConfig::new("in", "/tmp");
        path.age_window = 1.5;
        let filter = PathFilter::new(&path, now).unwrap();
        assert!(filter.is_recent(now - Duration::minutes(89)));
        assert!(!filter.is_recent(now - Duration::minutes(91)));
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = check_size(10, 8).unwrap_err();
        assert!(err.is_user_error());
        assert_eq!(err.to_string(), "File size mismatch (expected 10 got 8)");
        assert!(check_size(8, 8).is_ok());
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("/out/", "a.csv"), "/out/a.csv");
        assert_eq!(remote_join("", "a.csv"), "a.csv");
        assert!(temp_name().starts_with('.'));
        assert!(temp_name().ends_with('~'));
    }
}
