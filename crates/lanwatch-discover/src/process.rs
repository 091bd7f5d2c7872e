//! External process execution.
//!
//! Every probe backend shells out (nmap, ping, arp, arp-scan). They all go
//! through [`ProcessRunner`] so a sweep can be driven without spawning real
//! processes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{DiscoverError, Result};

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawns a program, captures its output, and enforces an optional deadline.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput>;
}

/// Runs processes with `tokio::process::Command`.
///
/// Children are killed if the deadline elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| DiscoverError::Timeout {
                    program: program.to_string(),
                    seconds: limit.as_secs(),
                })?,
            None => child.await,
        }
        .map_err(|source| DiscoverError::Spawn {
            program: program.to_string(),
            source,
        })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = TokioProcessRunner
            .run("lanwatch-definitely-not-installed", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::Spawn { .. }));
    }

    #[test]
    fn test_output_helpers() {
        let out = ProcessOutput {
            code: Some(0),
            stdout: b"hello".to_vec(),
            stderr: Vec::new(),
        };
        assert!(out.success());
        assert_eq!(out.stdout_lossy(), "hello");
        assert!(!ProcessOutput::default().success());
    }
}
