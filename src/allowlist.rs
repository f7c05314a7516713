//! Allowlist file loading.
//!
//! One command per line, blank lines and `#` comments skipped. The file is
//! read on every call so operators can edit it while the gateway runs.

use std::io;
use std::path::Path;

/// Snapshot of the allowlist file at the time it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    entries: Vec<String>,
}

impl Allowlist {
    /// Read the allowlist at `path`. A missing file yields an empty list.
    pub async fn load(path: &Path) -> io::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Allowlist {} not found, denying everything", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();
        Self { entries }
    }

    /// Exact, byte-for-byte membership.
    pub fn contains(&self, cmd: &str) -> bool {
        self.entries.iter().any(|entry| entry == cmd)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
