use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::records::SettledBlock;

/// Ordered delivery of settled blocks.
pub trait ChainSource: Send + Sync {
    /// Highest settled height, `None` when nothing has settled yet
    fn tip_height(&self) -> impl Future<Output = Result<Option<u64>>> + Send;

    fn fetch_block(&self, height: u64) -> impl Future<Output = Result<SettledBlock>> + Send;
}

/// Reads `<dir>/<height>.json` files written by a settlement-layer exporter.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn block_path(&self, height: u64) -> PathBuf {
        self.dir.join(format!("{height}.json"))
    }
}

impl ChainSource for JsonDirSource {
    async fn tip_height(&self) -> Result<Option<u64>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to list {}", self.dir.display()));
            }
        };

        let mut tip = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let height = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(h) = height {
                tip = tip.max(Some(h));
            }
        }
        Ok(tip)
    }

    async fn fetch_block(&self, height: u64) -> Result<SettledBlock> {
        let path = self.block_path(height);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let block: SettledBlock = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if block.height != height {
            bail!("{} holds block {}", path.display(), block.height);
        }
        Ok(block)
    }
}
