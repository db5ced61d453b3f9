//! Append-only JSON-lines journal of committed transitions.
//!
//! One transition per line, flushed and synced before the in-memory index is
//! touched. Replaying the journal from the top rebuilds the index exactly.
//! A final line without its newline is an append cut short by a crash; it
//! was never applied, so replay drops it and truncates the file.

use std::path::{Path, PathBuf};

use accord_types::CommittedTransition;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{VaultError, VaultResult};

pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Open (creating if needed) the journal at `path` and return the
    /// transitions already recorded in it, oldest first.
    pub async fn open(path: impl AsRef<Path>) -> VaultResult<(Self, Vec<CommittedTransition>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let existing = match fs::read(&path).await {
            Ok(bytes) => {
                let complete = complete_prefix(&bytes);
                if complete < bytes.len() {
                    warn!(
                        path = %path.display(),
                        dropped_bytes = bytes.len() - complete,
                        "dropping partial journal record"
                    );
                    let file = OpenOptions::new().write(true).open(&path).await?;
                    file.set_len(complete as u64).await?;
                    file.sync_data().await?;
                }
                let contents = std::str::from_utf8(&bytes[..complete])
                    .map_err(|e| VaultError::Serialization(e.to_string()))?;
                parse(contents)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok((
            Self {
                path,
                file: Mutex::new(file),
            },
            existing,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, committed: &CommittedTransition) -> VaultResult<()> {
        let mut line =
            serde_json::to_vec(committed).map_err(|e| VaultError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Length of `bytes` up to and including the last newline.
fn complete_prefix(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |last| last + 1)
}

fn parse(contents: &str) -> VaultResult<Vec<CommittedTransition>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| VaultError::CorruptJournal {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse("\n\n").unwrap().is_empty());
    }

    #[test]
    fn complete_prefix_stops_at_last_newline() {
        assert_eq!(complete_prefix(b""), 0);
        assert_eq!(complete_prefix(b"{\"id\""), 0);
        assert_eq!(complete_prefix(b"{}\n{\"id"), 3);
        assert_eq!(complete_prefix(b"{}\n{}\n"), 6);
    }

    #[test]
    fn garbage_reports_line_number() {
        let err = parse("\n{not json}\n").unwrap_err();
        assert!(matches!(err, VaultError::CorruptJournal { line: 2, .. }));
    }
}
