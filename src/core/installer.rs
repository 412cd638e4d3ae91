use std::path::Path;

use tracing::warn;

use crate::error::{ClientError, Result};

/// C6: moves the completed scratch file into place, preserving a
/// `.zs-old` backup of whatever was already there (spec §4.6). Grounded
/// in `original_source/client.c`'s `zsync_client` backup/rename sequence
/// and `set_mtime`.
pub struct Installer;

impl Installer {
    pub async fn install(working_path: &Path, target_path: &Path, mtime: Option<i64>) -> Result<()> {
        if tokio::fs::metadata(target_path).await.is_ok() {
            let backup_path = Self::backup_path(target_path);
            tokio::fs::remove_file(&backup_path).await.ok();
            tokio::fs::hard_link(target_path, &backup_path)
                .await
                .map_err(|e| ClientError::BackupFailed { target_path: target_path.to_path_buf(), reason: e.to_string() })?;
        }

        // `rename` atomically replaces `target_path` if it already exists
        // (POSIX semantics), so the backup above and this rename never
        // leave a window where `target_path` is missing.
        tokio::fs::rename(working_path, target_path)
            .await
            .map_err(|e| ClientError::MoveFailed {
                part_path: working_path.to_path_buf(),
                target_path: target_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(mtime) = mtime {
            if let Err(e) = Self::set_mtime(target_path, mtime).await {
                // Non-fatal: a wrong mtime doesn't invalidate the download.
                warn!(target = %target_path.display(), error = %e, "failed to set mtime on installed file");
            }
        }

        Ok(())
    }

    fn backup_path(target_path: &Path) -> std::path::PathBuf {
        let mut name = target_path.as_os_str().to_os_string();
        name.push(".zs-old");
        std::path::PathBuf::from(name)
    }

    async fn set_mtime(target_path: &Path, mtime: i64) -> Result<()> {
        let path = target_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&path)?;
            let atime = filetime::FileTime::from_last_access_time(&meta);
            let mtime_ft = filetime::FileTime::from_unix_time(mtime, 0);
            filetime::set_file_times(&path, atime, mtime_ft)
        })
        .await
        .map_err(|e| ClientError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn backs_up_existing_target_and_renames_in_working_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let working = dir.path().join(".out.bin.part");

        tokio::fs::write(&target, b"old").await.unwrap();
        tokio::fs::write(&working, b"new").await.unwrap();

        Installer::install(&working, &target, None).await.unwrap();

        let final_contents = tokio::fs::read(&target).await.unwrap();
        assert_eq!(final_contents, b"new");

        let backup_contents = tokio::fs::read(Installer::backup_path(&target)).await.unwrap();
        assert_eq!(backup_contents, b"old");
    }

    #[tokio::test]
    async fn installs_cleanly_when_no_prior_target_exists() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let working = dir.path().join(".out.bin.part");
        tokio::fs::write(&working, b"fresh").await.unwrap();

        Installer::install(&working, &target, None).await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"fresh");
        assert!(tokio::fs::metadata(Installer::backup_path(&target)).await.is_err());
    }
}
