use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use vox_realtime::SessionObserver;

/// Prints finished turns and writes generated images to disk.
pub struct ConsoleObserver {
    image_dir: PathBuf,
    images: AtomicUsize,
}

impl ConsoleObserver {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self { image_dir: image_dir.into(), images: AtomicUsize::new(0) }
    }

    async fn save_image(&self, base64_data: &str) -> anyhow::Result<PathBuf> {
        let bytes = STANDARD.decode(base64_data)?;
        tokio::fs::create_dir_all(&self.image_dir).await?;
        let index = self.images.fetch_add(1, Ordering::SeqCst) + 1;
        let path = image_path(&self.image_dir, index, &bytes);
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

fn image_path(dir: &Path, index: usize, bytes: &[u8]) -> PathBuf {
    let extension = match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, ..] => "jpg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "bin",
    };
    dir.join(format!("image-{index:03}.{extension}"))
}

#[async_trait]
impl SessionObserver for ConsoleObserver {
    async fn on_transcript_update(&self, input: &str, output: &str, is_final: bool) {
        if !is_final {
            return;
        }
        if !input.trim().is_empty() {
            println!("You   -> {}", input.trim());
        }
        if !output.trim().is_empty() {
            println!("Model -> {}\n", output.trim());
        }
    }

    async fn on_image_generated(&self, base64_data: &str) {
        match self.save_image(base64_data).await {
            Ok(path) => println!("[image saved to {}]", path.display()),
            Err(e) => tracing::warn!(error = %e, "Failed to save generated image"),
        }
    }

    async fn on_status_change(&self, is_active: bool) {
        if is_active {
            println!("Connected. Start talking; Ctrl+C to end.\n");
        } else {
            println!("Session ended.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_from_magic_bytes() {
        let dir = Path::new("out");
        assert_eq!(image_path(dir, 1, &[0x89, b'P', b'N', b'G', 0x0D]), dir.join("image-001.png"));
        assert_eq!(image_path(dir, 12, &[0xFF, 0xD8, 0xFF]), dir.join("image-012.jpg"));
        assert_eq!(image_path(dir, 3, b"hello"), dir.join("image-003.bin"));
    }

    #[tokio::test]
    async fn test_saves_numbered_images() {
        let dir = std::env::temp_dir().join(format!("vox-cli-images-{}", std::process::id()));
        let observer = ConsoleObserver::new(&dir);
        let png = STANDARD.encode([0x89, b'P', b'N', b'G', 1, 2, 3]);

        let first = observer.save_image(&png).await.unwrap();
        let second = observer.save_image(&png).await.unwrap();

        assert_eq!(first, dir.join("image-001.png"));
        assert_eq!(second, dir.join("image-002.png"));
        assert_eq!(tokio::fs::read(&first).await.unwrap(), vec![0x89, b'P', b'N', b'G', 1, 2, 3]);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_invalid_base64_is_error() {
        let observer = ConsoleObserver::new(std::env::temp_dir());
        assert!(observer.save_image("not base64!").await.is_err());
    }
}
