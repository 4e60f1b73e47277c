use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::error::{AppError, Result};

pub async fn ensure_dir(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        fs::create_dir_all(path).await?;
    }
    Ok(path.to_path_buf())
}

/// File names in `dir`, sorted. A missing directory yields an empty list.
pub async fn list_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Reads a JSON file, returning `None` on first run when it does not exist yet.
pub async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
            AppError::ParseError(format!("Failed to parse {}: {}", path.display(), e))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    fs::write(path, serde_json::to_string(value)?).await?;
    Ok(())
}

pub async fn read_text_opt(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// String map persisted between runs so repeated network calls can be skipped.
pub struct JsonCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonCache {
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = match read_json_opt(&path).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable cache");
                BTreeMap::new()
            }
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub async fn save(&self) -> Result<()> {
        write_json(&self.path, &self.entries).await?;
        info!(path = %self.path.display(), entries = self.entries.len(), "Cache saved");
        Ok(())
    }
}

/// Append-only text log persisted next to task results.
pub struct TaskLog {
    path: PathBuf,
}

impl TaskLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, lines: &[String]) -> Result<()> {
        let mut content = read_text_opt(&self.path).await?.unwrap_or_default();
        for line in lines {
            info!("{}", line);
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(line);
        }
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).await?;
        }
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("agent-tasks-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_cache_roundtrip_and_missing_file() {
        let dir = temp_dir("cache");
        let path = dir.join("transcriptions.json");

        let mut cache = JsonCache::load(path.clone()).await.unwrap();
        assert!(cache.entries().is_empty());

        cache.insert("adam", "Andrzej Maj wykładał...");
        cache.save().await.unwrap();

        let reloaded = JsonCache::load(path).await.unwrap();
        assert_eq!(reloaded.get("adam"), Some("Andrzej Maj wykładał..."));
        assert!(!reloaded.contains("monika"));
    }

    #[tokio::test]
    async fn test_list_files_sorted_and_missing_dir() {
        let dir = temp_dir("list");
        std::fs::write(dir.join("b.txt"), "b").unwrap();
        std::fs::write(dir.join("a.mp3"), "a").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();

        assert_eq!(list_files(&dir).await.unwrap(), vec!["a.mp3", "b.txt"]);
        assert!(list_files(&dir.join("absent")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_log_appends_lines() {
        let dir = temp_dir("log");
        let log = TaskLog::new(dir.join("search").join("barbara.txt"));
        log.append(&["first".to_string()]).await.unwrap();
        log.append(&["second".to_string(), "third".to_string()]).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "first\nsecond\nthird");
    }
}
