use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Per-channel state files under one directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn read_last_line(&self, path: &str) -> Result<Option<String>> {
        let full_path = self.base_path.join(path);

        let file = match File::open(&full_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Stream the file so only one line is held at a time.
        let mut lines = BufReader::new(file).lines();
        let mut last = None;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                last = Some(line);
            }
        }

        Ok(last)
    }

    async fn append_line(&self, path: &str, line: &str) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full_path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }
}
