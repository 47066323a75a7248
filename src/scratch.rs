use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Scratch namespace holding the transient files of one pipeline invocation.
///
/// Every invocation gets its own directory under the scratch root, named by a
/// generated identifier, so concurrent invocations can never observe each
/// other's files. The namespace must not outlive its invocation: callers
/// release it on every exit path, and `Drop` removes whatever is left if an
/// invocation unwinds before getting there.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
    released: bool,
}

impl Scratch {
    /// Allocate a fresh namespace under `root`.
    pub async fn create(root: &Path) -> std::io::Result<Self> {
        let dir = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            released: false,
        })
    }

    /// Path of a named transient file inside this namespace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove the namespace and everything in it.
    ///
    /// Idempotent: releasing twice, or releasing a namespace whose files are
    /// already gone, is not an error.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove scratch dir {}: {}", self.dir.display(), e),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn release_removes_namespace() {
        let root = TempDir::new().unwrap();
        let mut scratch = Scratch::create(root.path()).await.unwrap();

        let file = scratch.path("audio.wav");
        tokio::fs::write(&file, b"pcm").await.unwrap();
        assert!(file.exists());

        scratch.release().await;
        assert!(!file.exists());
        assert!(!scratch.dir().exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let root = TempDir::new().unwrap();
        let mut scratch = Scratch::create(root.path()).await.unwrap();

        scratch.release().await;
        scratch.release().await;
        assert!(!scratch.dir().exists());
    }

    #[tokio::test]
    async fn namespaces_are_distinct() {
        let root = TempDir::new().unwrap();
        let a = Scratch::create(root.path()).await.unwrap();
        let b = Scratch::create(root.path()).await.unwrap();

        assert_ne!(a.dir(), b.dir());
        assert_ne!(a.path("audio.wav"), b.path("audio.wav"));
    }

    #[tokio::test]
    async fn drop_removes_unreleased_namespace() {
        let root = TempDir::new().unwrap();
        let dir = {
            let scratch = Scratch::create(root.path()).await.unwrap();
            tokio::fs::write(scratch.path("input.ogg"), b"ogg")
                .await
                .unwrap();
            scratch.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
