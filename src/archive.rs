use crate::config::{ArchiveConfig, StorageConfig};
use crate::error::{LapsecamError, Result};
use crate::video::VideoAssembler;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info};

/// One completed session as it appears in the library listing.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub id: String,
    /// Newest frame's modification time, rendered in the display timezone
    pub date: String,
    pub frames: usize,
    pub name: String,
}

/// Operations over completed, on-disk session directories. Independent of any
/// live session: entries are reconstructed purely from the filesystem.
pub struct Archive {
    storage: StorageConfig,
    config: ArchiveConfig,
    assembler: Arc<dyn VideoAssembler>,
    timezone: Tz,
}

impl Archive {
    pub fn new(
        storage: StorageConfig,
        config: ArchiveConfig,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Result<Self> {
        let timezone = config
            .display_timezone
            .parse::<Tz>()
            .map_err(|_| {
                LapsecamError::invalid_config(format!(
                    "unknown display timezone: {}",
                    config.display_timezone
                ))
            })?;

        Ok(Self {
            storage,
            config,
            assembler,
            timezone,
        })
    }

    /// Enumerate all session directories holding at least one frame, newest
    /// first. Sessions that captured nothing leave no entry.
    pub async fn list(&self) -> Result<Vec<ArchiveEntry>> {
        let root = PathBuf::from(&self.storage.timelapse_path);
        if !fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&root).await?;

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let frames = self.frame_files(&entry.path()).await?;
            if frames.is_empty() {
                continue;
            }

            let newest = frames
                .iter()
                .map(|(_, mtime)| *mtime)
                .max()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let id = entry.file_name().to_string_lossy().into_owned();
            let short: String = id.chars().take(8).collect();

            entries.push(ArchiveEntry {
                date: self.format_timestamp(newest),
                frames: frames.len(),
                name: format!("Timelapse {short}"),
                id,
            });
        }

        entries.sort_by(|a, b| b.date.cmp(&a.date));
        debug!("Listed {} archived timelapses", entries.len());
        Ok(entries)
    }

    /// Assemble a session's frames into a video, ordered by modification time.
    /// All-or-nothing: on failure no file remains at the output path.
    pub async fn assemble(&self, id: &str) -> Result<PathBuf> {
        let dir = self.session_dir(id)?;
        if !fs::try_exists(&dir).await? {
            return Err(LapsecamError::not_found(id));
        }

        let mut frames = self.frame_files(&dir).await?;
        if frames.is_empty() {
            return Err(LapsecamError::not_found(id));
        }
        frames.sort_by_key(|(_, mtime)| *mtime);
        let ordered: Vec<PathBuf> = frames.into_iter().map(|(path, _)| path).collect();

        let output = PathBuf::from(&self.storage.video_temp_path).join(format!("{id}.mp4"));

        info!(
            "Assembling timelapse {} ({} frames) into {}",
            id,
            ordered.len(),
            output.display()
        );

        if let Err(e) = self
            .assembler
            .assemble(&ordered, &output, self.config.output_fps)
            .await
        {
            // The assembler may have written partial bytes before failing
            let _ = fs::remove_file(&output).await;
            return Err(e);
        }

        Ok(output)
    }

    /// Remove a session directory and everything in it. No rollback: an I/O
    /// failure leaves the directory in whatever state the failure left it.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let dir = self.session_dir(id)?;
        if !fs::try_exists(&dir).await? {
            return Err(LapsecamError::not_found(id));
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| LapsecamError::DeletionFailed {
                id: id.to_string(),
                source: e,
            })?;

        info!("Deleted timelapse {}", id);
        Ok(())
    }

    /// Resolve a session id to its directory, rejecting ids that would escape
    /// the timelapse root.
    fn session_dir(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains('/')
            || id.contains('\\')
        {
            return Err(LapsecamError::not_found(id));
        }
        Ok(PathBuf::from(&self.storage.timelapse_path).join(id))
    }

    async fn frame_files(&self, dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut frames = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str())
                != Some(self.storage.frame_extension.as_str())
            {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            frames.push((path, metadata.modified()?));
        }

        Ok(frames)
    }

    fn format_timestamp(&self, time: SystemTime) -> String {
        let utc: DateTime<Utc> = time.into();
        utc.with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoAssembler;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Mock assembler that either concatenates frame bytes or fails after
    /// writing partial output.
    struct MockAssembler {
        fail_after_frames: Option<usize>,
    }

    #[async_trait]
    impl VideoAssembler for MockAssembler {
        async fn assemble(&self, frames: &[PathBuf], output: &Path, _fps: u32) -> Result<()> {
            let mut bytes = Vec::new();
            for (index, frame) in frames.iter().enumerate() {
                if self.fail_after_frames == Some(index) {
                    tokio::fs::write(output, &bytes).await?;
                    return Err(LapsecamError::assembly("simulated encoder failure"));
                }
                bytes.extend(tokio::fs::read(frame).await?);
            }
            tokio::fs::write(output, &bytes).await?;
            Ok(())
        }
    }

    fn test_archive(dir: &TempDir, fail_after_frames: Option<usize>) -> Archive {
        let storage = StorageConfig {
            timelapse_path: dir.path().join("timelapses").to_string_lossy().to_string(),
            video_temp_path: dir.path().join("videos").to_string_lossy().to_string(),
            frame_extension: "jpg".to_string(),
        };
        let config = ArchiveConfig {
            output_fps: 30,
            display_timezone: "UTC".to_string(),
        };
        std::fs::create_dir_all(dir.path().join("timelapses")).unwrap();
        std::fs::create_dir_all(dir.path().join("videos")).unwrap();

        Archive::new(storage, config, Arc::new(MockAssembler { fail_after_frames })).unwrap()
    }

    fn write_frames(archive_root: &Path, id: &str, count: usize) -> PathBuf {
        let dir = archive_root.join("timelapses").join(id);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            std::fs::write(dir.join(format!("frame_{i}.jpg")), format!("frame{i}")).unwrap();
            // Distinct mtimes so ordering is deterministic
            std::thread::sleep(Duration::from_millis(5));
        }
        dir
    }

    #[tokio::test]
    async fn test_list_skips_empty_directories() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);

        write_frames(dir.path(), "full-session", 3);
        std::fs::create_dir_all(dir.path().join("timelapses").join("empty-session")).unwrap();

        let entries = archive.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "full-session");
        assert_eq!(entries[0].frames, 3);
        assert_eq!(entries[0].name, "Timelapse full-ses");
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);
        std::fs::remove_dir(dir.path().join("timelapses")).unwrap();

        assert!(archive.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assemble_orders_frames_by_mtime() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);
        write_frames(dir.path(), "abc", 3);

        let output = archive.assemble("abc").await.unwrap();
        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(bytes, b"frame0frame1frame2");
    }

    #[tokio::test]
    async fn test_assemble_unknown_session() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);

        let result = archive.assemble("missing").await;
        assert!(matches!(result, Err(LapsecamError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_assemble_empty_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);
        std::fs::create_dir_all(dir.path().join("timelapses").join("bare")).unwrap();

        let result = archive.assemble("bare").await;
        assert!(matches!(result, Err(LapsecamError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_assembly_leaves_no_partial_output() {
        let dir = TempDir::new().unwrap();
        // Fails once the second frame is reached, after partial bytes exist
        let archive = test_archive(&dir, Some(1));
        write_frames(dir.path(), "abc", 3);

        let result = archive.assemble("abc").await;
        assert!(matches!(result, Err(LapsecamError::AssemblyFailed { .. })));
        assert!(!dir.path().join("videos").join("abc.mp4").exists());
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);
        let session_dir = write_frames(dir.path(), "abc", 2);

        archive.delete("abc").await.unwrap();
        assert!(!session_dir.exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_session() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);

        let result = archive.delete("missing").await;
        assert!(matches!(result, Err(LapsecamError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_the_root() {
        let dir = TempDir::new().unwrap();
        let archive = test_archive(&dir, None);

        for id in ["..", "../other", "a/b", ""] {
            let result = archive.delete(id).await;
            assert!(matches!(result, Err(LapsecamError::SessionNotFound { .. })));
        }
    }
}
