use chrono::Utc;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes screenshots as `screenshot_<unix-millis>.png` under a directory and
/// hands back a public reference to the file.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Persist PNG bytes and return the reference.
    ///
    /// Concurrent tasks may capture within the same millisecond, so files are
    /// created exclusively and the timestamp is bumped until a free name is
    /// found.
    pub async fn save(&self, png: &[u8]) -> std::io::Result<String> {
        fs::create_dir_all(&self.dir).await?;

        let mut timestamp = Utc::now().timestamp_millis();
        loop {
            let filename = format!("screenshot_{timestamp}.png");
            let path = self.dir.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(png).await?;
                    file.flush().await?;
                    return Ok(format!("{}/{}", self.url_prefix, filename));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => timestamp += 1,
                Err(e) => return Err(e),
            }
        }
    }
}
