//! Encoder double used by the unit tests.

use crate::encoder::{EncodeJob, Encoder};
use crate::error::OptimizeError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Succeed,
    Fail,
    Hang,
    Silent,
    DiskFull,
}

/// Scripted encoder that records every source it was asked to encode
pub struct FakeEncoder {
    behavior: Behavior,
    available: bool,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeEncoder {
    /// Bytes written by a successful encode
    pub const OUTPUT: &'static [u8] = b"optimized";

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            available: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    /// Writes a partial file, then fails like a crashed encoder
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Fail)
    }

    /// Never finishes
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    /// Exits cleanly without producing any bytes
    pub fn silent() -> Self {
        Self::with_behavior(Behavior::Silent)
    }

    /// Runs out of space on the output volume
    pub fn disk_full() -> Self {
        Self::with_behavior(Behavior::DiskFull)
    }

    /// Fails the availability check
    pub fn missing() -> Self {
        Self {
            available: false,
            ..Self::succeeding()
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_available(&self) -> Result<(), OptimizeError> {
        if self.available {
            Ok(())
        } else {
            Err(OptimizeError::MissingDependency("fake encoder not installed".to_string()))
        }
    }

    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), OptimizeError> {
        self.calls.lock().unwrap().push(job.source.to_path_buf());

        match self.behavior {
            Behavior::Succeed => {
                tokio::fs::write(job.target, Self::OUTPUT).await?;
                Ok(())
            }
            Behavior::Fail => {
                tokio::fs::write(job.target, b"partial").await?;
                Err(OptimizeError::Transcode {
                    path: job.source.to_path_buf(),
                    code: Some(1),
                    stderr: "fake failure".to_string(),
                })
            }
            Behavior::Hang => {
                tokio::fs::write(job.target, b"partial").await?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Behavior::Silent => Ok(()),
            Behavior::DiskFull => Err(OptimizeError::output_write(
                job.target,
                std::io::Error::new(std::io::ErrorKind::StorageFull, "No space left on device"),
            )),
        }
    }
}
