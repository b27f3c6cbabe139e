use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::fs;
use tracing::{info, warn};

const TEMP_DIR: &str = "temp";
const MAX_STEM_LEN: usize = 50;

/// A file written to the upload area.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub filename: String,
    pub stored_path: String,
    pub size: u64,
}

/// On-disk storage for uploaded documents and attachments.
///
/// Files live at `{dir}/{category}/{stored_name}`. Bytes are written under
/// `{dir}/temp` first and renamed into place, so an interrupted write only
/// ever leaves debris in `temp`, which [`prune_temp`](Self::prune_temp) clears.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(dir.join(TEMP_DIR)).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub async fn save(
        &self,
        category: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<SavedFile> {
        let name = stored_name(original_name);
        let staging = self.dir.join(TEMP_DIR).join(&name);
        let target_dir = self.dir.join(category);
        fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(&name);

        fs::write(&staging, data).await?;
        fs::rename(&staging, &target).await?;

        Ok(SavedFile {
            filename: original_name.to_string(),
            stored_path: target.to_string_lossy().into_owned(),
            size: data.len() as u64,
        })
    }

    /// Whether `stored_path` names a file inside `{dir}/{category}/`.
    pub fn holds(&self, category: &str, stored_path: &str) -> bool {
        let path = Path::new(stored_path);
        let base = self.dir.join(category);
        path.starts_with(&base) && path != base && !climbs(path)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn delete_file(&self, stored_path: &str) -> Result<()> {
        let path = Path::new(stored_path);
        if !path.starts_with(&self.dir) || climbs(path) {
            anyhow::bail!("refusing to delete {} outside the upload directory", stored_path);
        }
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Upload {} already gone", stored_path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete files in the temp area whose last modification is at least `max_age` ago.
    pub async fn prune_temp(&self, max_age: Duration) -> Result<usize> {
        let mut entries = fs::read_dir(self.dir.join(TEMP_DIR)).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta.modified()?.elapsed().unwrap_or_default();
            if age >= max_age {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// `{sanitized-stem}-{unix millis}-{12 hex}{.ext}`, extension lowercased.
pub fn stored_name(original: &str) -> String {
    let path = Path::new(original);
    let stem: String = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .take(MAX_STEM_LEN)
        .collect();
    let stem = if stem.trim_matches('-').is_empty() { "file".to_string() } else { stem };

    let suffix: [u8; 6] = rand::random();
    format!(
        "{}-{}-{}{}",
        stem,
        Utc::now().timestamp_millis(),
        hex::encode(suffix),
        extension(original).map(|e| format!(".{}", e)).unwrap_or_default()
    )
}

/// Lowercased extension without the dot.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn climbs(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_name_is_sanitized_and_unique() {
        let a = stored_name("../My CV (final).PDF");
        let b = stored_name("../My CV (final).PDF");
        assert!(a.starts_with("My-CV--final--"), "{}", a);
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);

        let parts: Vec<&str> = a.trim_end_matches(".pdf").rsplitn(3, '-').collect();
        assert_eq!(parts[0].len(), 12);
        assert!(parts[0].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[1].parse::<i64>().is_ok());
    }

    #[test]
    fn stored_name_without_usable_stem() {
        let name = stored_name("???.txt");
        assert!(name.starts_with("file-"));
        assert!(name.ends_with(".txt"));
        assert!(!stored_name("README").contains('.'));
    }

    #[tokio::test]
    async fn save_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();

        let saved = storage.save("cv", "resume.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(saved.size, 8);
        assert!(saved.stored_path.contains("/cv/"));
        assert!(Path::new(&saved.stored_path).exists());

        storage.delete_file(&saved.stored_path).await.unwrap();
        assert!(!Path::new(&saved.stored_path).exists());
        storage.delete_file(&saved.stored_path).await.unwrap();
        assert!(storage.delete_file("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn holds_only_paths_inside_the_category() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let saved = storage.save("messages", "notes.txt", b"hi").await.unwrap();
        assert!(storage.holds("messages", &saved.stored_path));
        assert!(!storage.holds("cv", &saved.stored_path));

        let base = dir.path().join("messages");
        assert!(!storage.holds("messages", &base.to_string_lossy()));
        let escape = base.join("..").join("cv").join("x.pdf");
        assert!(!storage.holds("messages", &escape.to_string_lossy()));
        assert!(!storage.holds("messages", "/etc/passwd"));
        assert!(storage.delete_file(&escape.to_string_lossy()).await.is_err());
    }

    #[tokio::test]
    async fn prune_temp_respects_age() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();
        let stale = dir.path().join(TEMP_DIR).join("partial.bin");
        fs::write(&stale, b"abc").await.unwrap();

        assert_eq!(storage.prune_temp(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(stale.exists());
        assert_eq!(storage.prune_temp(Duration::ZERO).await.unwrap(), 1);
        assert!(!stale.exists());
    }
}
