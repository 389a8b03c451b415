use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::info;

use crate::environment::Frame;

/// User-facing announcements: activation, accepted tasks, each action's
/// rationale and the completion summary. A speech synthesizer is one
/// possible implementation.
pub trait Narrator: Send + Sync {
    fn announce(&self, text: &str);
}

pub struct LogNarrator;

impl Narrator for LogNarrator {
    fn announce(&self, text: &str) {
        if !text.trim().is_empty() {
            info!(target: "cua_operator::narration", "{}", text.trim());
        }
    }
}

/// Optional archive of captured frames.
#[async_trait]
pub trait FrameStore: Send + Sync {
    async fn save(&self, session_id: &str, step: usize, frame: &Frame) -> std::io::Result<PathBuf>;
}

/// Writes frames to `<base>/<session>/step_NNN.<ext>`.
pub struct DiskFrameStore {
    base_dir: PathBuf,
}

impl DiskFrameStore {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self { base_dir: base.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl FrameStore for DiskFrameStore {
    async fn save(&self, session_id: &str, step: usize, frame: &Frame) -> std::io::Result<PathBuf> {
        let dir = self.base_dir.join(session_id);
        async_fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("step_{:03}.{}", step, frame.extension()));
        async_fs::write(&path, &frame.bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_land_under_session_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskFrameStore::new(tmp.path());
        let frame = Frame {
            bytes: vec![0xff, 0xd8, 0xff],
            width: 2,
            height: 2,
            mime_type: "image/jpeg".into(),
            capture_id: "cap".into(),
        };

        let path = store.save("sess", 3, &frame).await.unwrap();
        assert_eq!(path, tmp.path().join("sess").join("step_003.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), frame.bytes);
    }
}
