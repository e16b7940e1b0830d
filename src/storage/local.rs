use std::path::{Path, PathBuf};

use crate::{error::AppResult, storage::GraphStore};

/// Writes graphs into a local directory, served under `/graphs`
#[derive(Debug, Clone)]
pub struct LocalGraphStore {
    dir: PathBuf,
}

impl LocalGraphStore {
    pub fn new(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl GraphStore for LocalGraphStore {
    async fn upload_graph(&self, blob_name: &str, png: Vec<u8>) -> AppResult<()> {
        let path = self.dir.join(blob_name);
        tokio::fs::write(&path, &png).await?;

        tracing::info!(path = %path.display(), size_bytes = png.len(), "Graph written");
        Ok(())
    }

    fn public_base_url(&self) -> Option<String> {
        None
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
