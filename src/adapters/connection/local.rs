//! Local filesystem backend
//!
//! Paths are directories. With a jail configured, relative paths resolve
//! inside it and nothing outside it is reachable.

use super::filter::{check_size, eligible_outputs, temp_name, PathFilter};
use super::traits::{Connection, TransferContext};
use crate::config::schema::PathConfig;
use crate::domain::{Attachment, EdiError, NewAttachment, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

pub struct LocalConnection {
    jail: Option<PathBuf>,
}

/// Lexically resolves `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl LocalConnection {
    pub fn new(jail: Option<PathBuf>) -> Self {
        Self {
            jail: jail.map(|j| normalize(&j)),
        }
    }

    /// Directory for a path locator
    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let requested = Path::new(locator);
        let Some(jail) = &self.jail else {
            return Ok(requested.to_path_buf());
        };
        let resolved = normalize(&jail.join(requested));
        if !resolved.starts_with(jail) {
            return Err(EdiError::user(format!(
                "Path {} is outside the jail {}",
                locator,
                jail.display()
            )));
        }
        Ok(resolved)
    }
}

/// Writes `data` to a temporary file in `dir` and renames it onto `dest`
///
/// The temporary file is removed if either step fails.
async fn deposit(dir: &Path, dest: &Path, data: &[u8]) -> Result<()> {
    let temp = dir.join(temp_name());
    let written = match fs::write(&temp, data).await {
        Ok(()) => fs::rename(&temp, dest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl Connection for LocalConnection {
    async fn receive_inputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let dir = self.resolve(&path.path)?;
        let filter = PathFilter::new(path, cx.now)?;

        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            EdiError::Connection(format!("Cannot read directory {}: {}", dir.display(), e))
        })?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            candidates.push((name, entry.path(), metadata));
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut received = Vec::new();
        for (name, file, metadata) in candidates {
            if !filter.matches_name(&name) {
                continue;
            }
            let modified: DateTime<Utc> = metadata.modified()?.into();
            if !filter.is_recent(modified) {
                tracing::debug!(file = %name, "Skipping file outside age window");
                continue;
            }
            let size = metadata.len();
            if cx.session.input_exists(&name, size as usize).await? {
                tracing::debug!(file = %name, size, "Skipping already received file");
                continue;
            }
            let data = fs::read(&file).await?;
            check_size(size, data.len())?;
            let attachment = cx
                .session
                .create_attachment(NewAttachment::input(name, data))
                .await?;
            received.push(attachment);
        }
        Ok(received)
    }

    async fn send_outputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>> {
        let dir = self.resolve(&path.path)?;
        let filter = PathFilter::new(path, cx.now)?;

        let mut outputs: Vec<Attachment> = eligible_outputs(&mut *cx.session, path, &filter)
            .await?
            .into_iter()
            .flat_map(|(_, outputs)| outputs)
            .collect();
        outputs.sort_by_key(|a| a.id);

        let mut sent = Vec::new();
        for attachment in outputs {
            let dest = dir.join(&attachment.name);
            if let Ok(existing) = fs::metadata(&dest).await {
                if existing.len() == attachment.size() as u64 {
                    tracing::debug!(file = %attachment.name, "Skipping file already at destination");
                    continue;
                }
            }

            deposit(&dir, &dest, &attachment.data).await?;
            tracing::info!(file = %dest.display(), "Wrote output");
            sent.push(attachment);
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_without_jail() {
        let connection = LocalConnection::new(None);
        assert_eq!(connection.resolve("/tmp/in").unwrap(), PathBuf::from("/tmp/in"));
    }

    #[test]
    fn test_resolve_inside_jail() {
        let connection = LocalConnection::new(Some(PathBuf::from("/srv/edi")));
        assert_eq!(
            connection.resolve("partner/in").unwrap(),
            PathBuf::from("/srv/edi/partner/in")
        );
        assert_eq!(
            connection.resolve("/srv/edi/out").unwrap(),
            PathBuf::from("/srv/edi/out")
        );
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with('~'))
            .collect()
    }

    #[tokio::test]
    async fn test_deposit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partner.csv");
        std::fs::write(&dest, "stale").unwrap();

        deposit(dir.path(), &dest, b"name\n").await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"name\n");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be replaced by a file
        let dest = dir.path().join("partner.csv");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), "x").unwrap();

        assert!(deposit(dir.path(), &dest, b"name\n").await.is_err());
        assert!(leftovers(dir.path()).is_empty());
        assert!(dest.is_dir());
    }

    #[test]
    fn test_resolve_escaping_jail() {
        let connection = LocalConnection::new(Some(PathBuf::from("/srv/edi")));
        let err = connection.resolve("../etc").unwrap_err();
        assert!(err.is_user_error());
        assert!(connection.resolve("/etc/passwd").is_err());
    }
}
