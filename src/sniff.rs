//! Content-type sniffing over raw payload bytes.
//!
//! Leaves that declare no Content-Type are handed to a pluggable sniffing
//! capability. The production implementation pipes the bytes through the
//! `file(1)` tool; tests substitute stubs.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::SniffError;

/// Capability that guesses a media type from raw payload bytes.
#[async_trait]
pub trait TypeSniffer: Send + Sync {
    /// Returns the sniffed `type/subtype`, or `SniffError::Unavailable` when
    /// no sniffing tool exists on this host.
    async fn sniff(&self, data: &[u8]) -> Result<String, SniffError>;
}

/// Production sniffer: runs `<command> -b --mime -` with the payload on stdin.
pub struct FileCommandSniffer {
    command: String,
}

impl FileCommandSniffer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TypeSniffer for FileCommandSniffer {
    async fn sniff(&self, data: &[u8]) -> Result<String, SniffError> {
        let mut child = Command::new(&self.command)
            .args(["-b", "--mime", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    SniffError::Unavailable {
                        command: self.command.clone(),
                    }
                } else {
                    SniffError::Io {
                        command: self.command.clone(),
                        source,
                    }
                }
            })?;

        // Feed stdin while collecting output, so a large payload cannot
        // deadlock on a full pipe. A closed pipe just means the tool decided
        // early; the exit status tells the real story.
        let stdin = child.stdin.take();
        let (_, output) = tokio::join!(
            async {
                if let Some(mut stdin) = stdin {
                    let _ = stdin.write_all(data).await;
                    let _ = stdin.shutdown().await;
                }
            },
            child.wait_with_output(),
        );
        let output = output.map_err(|source| SniffError::Io {
            command: self.command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(SniffError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(normalize_media_type(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `file --mime` prints `type/subtype; charset=...`; keep only the type.
fn normalize_media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or(raw).trim().to_string()
}
