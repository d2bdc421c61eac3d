use anyhow::{Context, Result};
use doc_model::PageIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SESSION_SCHEMA_VERSION: u32 = 1;

/// Last viewed page per document, persisted between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionEnvelope {
    version: u32,
    pages: BTreeMap<String, PageIndex>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn last_page(&self, document: &Path) -> Result<Option<PageIndex>> {
        Ok(self.load()?.pages.get(&key(document)).copied())
    }

    pub fn remember(&self, document: &Path, page_index: PageIndex) -> Result<()> {
        let mut envelope = self.load()?;
        envelope.version = SESSION_SCHEMA_VERSION;
        envelope.pages.insert(key(document), page_index);

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.path, bytes)
            .with_context(|| format!("failed to write session state to {}", self.path.display()))?;
        Ok(())
    }

    fn load(&self) -> Result<SessionEnvelope> {
        if !self.path.exists() {
            return Ok(SessionEnvelope::default());
        }

        let bytes = fs::read(&self.path)?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse session state {}", self.path.display()))
    }
}

fn key(document: &Path) -> String {
    fs::canonicalize(document).unwrap_or_else(|_| document.to_path_buf()).display().to_string()
}
