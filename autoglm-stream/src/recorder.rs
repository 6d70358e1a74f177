//! Debug capture of relayed video
//!
//! Writes exactly what a viewer receives into a raw `.h264` file that
//! ffplay/ffprobe can open directly.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

const MAX_NAME_ATTEMPTS: u32 = 1000;

pub struct DebugRecorder {
    path: PathBuf,
    file: File,
}

impl DebugRecorder {
    /// Create `<dir>/<device>_<unix_millis>.h264`, adding `_<n>` when
    /// another viewer already took that name. Existing files are never
    /// truncated.
    pub async fn create(dir: &Path, device_id: &str) -> io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let stem = format!(
            "{}_{}",
            sanitize_file_component(device_id),
            chrono::Utc::now().timestamp_millis()
        );

        for n in 0..MAX_NAME_ATTEMPTS {
            let name = if n == 0 {
                format!("{stem}.h264")
            } else {
                format!("{stem}_{n}.h264")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    info!(device_id, path = %path.display(), "Saving video stream");
                    return Ok(Self { path, file });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free debug stream file name for {stem}"),
        ))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and flush so the file is usable even if the process dies.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await?;
        self.file.flush().await
    }

    pub async fn close(mut self) {
        let _ = self.file.flush().await;
        info!(path = %self.path.display(), "Closed debug stream file");
    }
}

/// `192.168.1.100:5555` → `192.168.1.100_5555`
fn sanitize_file_component(device_id: &str) -> String {
    device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
