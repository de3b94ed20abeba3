//! Remote data access through an operator-supplied command.
//!
//! Each request becomes `<template> <verb> <args...>` with stdout redirected
//! into a destination file. A failed attempt is retried once after a fixed
//! delay; a second failure is terminal.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use resync_consensus::{hash256_to_hex, Hash256};

use crate::cache::FetchCache;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchRequest {
    BlockHash { height: u32 },
    Block { hash: Hash256 },
    BlockHeader { hash: Hash256 },
}

impl FetchRequest {
    pub fn verb(&self) -> &'static str {
        match self {
            FetchRequest::BlockHash { .. } => "getblockhash",
            FetchRequest::Block { .. } => "getblock",
            FetchRequest::BlockHeader { .. } => "getblockheader",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            FetchRequest::BlockHash { height } => vec![height.to_string()],
            FetchRequest::Block { hash } => vec![hash256_to_hex(hash), "0".to_string()],
            FetchRequest::BlockHeader { hash } => vec![hash256_to_hex(hash)],
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum FetchError {
    EmptyTemplate,
    Spawn { command: String, error: io::Error },
    CommandFailed { command: String, status: Option<i32> },
    Unreadable { path: PathBuf, error: io::Error },
    EmptyOutput { path: PathBuf },
    Unavailable(String),
    Exhausted { request: String, last: Box<FetchError> },
}

impl FetchError {
    /// Whether another attempt may succeed. Configuration faults and
    /// exhausted retries are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::EmptyTemplate | FetchError::Exhausted { .. })
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::EmptyTemplate => write!(f, "no RPC call available (empty command template)"),
            FetchError::Spawn { command, error } => {
                write!(f, "failed to run command: {command}: {error}")
            }
            FetchError::CommandFailed { command, status } => match status {
                Some(code) => write!(f, "command exited with status {code}: {command}"),
                None => write!(f, "command terminated by signal: {command}"),
            },
            FetchError::Unreadable { path, error } => {
                write!(f, "RPC output {} unreadable: {error}", path.display())
            }
            FetchError::EmptyOutput { path } => {
                write!(f, "RPC call produced no output in {}", path.display())
            }
            FetchError::Unavailable(message) => write!(f, "{message}"),
            FetchError::Exhausted { request, last } => {
                write!(f, "RPC call {request} failed after retry: {last}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Transport that writes the raw response to `destination`.
pub trait RemoteSource {
    fn fetch(&self, request: &FetchRequest, destination: &Path) -> Result<(), FetchError>;
}

/// Runs the command template through `sh -c`.
#[derive(Clone, Debug)]
pub struct ShellSource {
    template: String,
}

impl ShellSource {
    pub fn new(template: impl Into<String>) -> Result<Self, FetchError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(FetchError::EmptyTemplate);
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn command_line(&self, request: &FetchRequest, destination: &Path) -> String {
        format!(
            "{} {request} > {}",
            self.template,
            shell_quote(&destination.to_string_lossy())
        )
    }
}

impl RemoteSource for ShellSource {
    fn fetch(&self, request: &FetchRequest, destination: &Path) -> Result<(), FetchError> {
        let command = self.command_line(request, destination);
        log_debug!("rpc: {command}");
        let status = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status()
            .map_err(|error| FetchError::Spawn {
                command: command.clone(),
                error,
            })?;
        if !status.success() {
            return Err(FetchError::CommandFailed {
                command,
                status: status.code(),
            });
        }
        Ok(())
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

pub struct FetchClient<S> {
    source: S,
    retry_delay: Duration,
}

impl<S: RemoteSource> FetchClient<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches `request` into `destination` and returns its text. The file
    /// is tracked by `cache` once it holds a usable response.
    pub fn fetch(
        &self,
        request: &FetchRequest,
        destination: &Path,
        cache: &mut FetchCache,
    ) -> Result<String, FetchError> {
        let text = match self.attempt(request, destination) {
            Ok(text) => text,
            Err(err) if err.is_retryable() => {
                log_warn!(
                    "RPC call {request} failed: {err}; waiting {} seconds and trying again",
                    self.retry_delay.as_secs()
                );
                thread::sleep(self.retry_delay);
                match self.attempt(request, destination) {
                    Ok(text) => text,
                    Err(last) => {
                        let _ = fs::remove_file(destination);
                        return Err(FetchError::Exhausted {
                            request: request.to_string(),
                            last: Box::new(last),
                        });
                    }
                }
            }
            Err(err) => return Err(err),
        };
        cache.track(destination);
        Ok(text)
    }

    fn attempt(&self, request: &FetchRequest, destination: &Path) -> Result<String, FetchError> {
        self.source.fetch(request, destination)?;
        let text = fs::read_to_string(destination).map_err(|error| FetchError::Unreadable {
            path: destination.to_path_buf(),
            error,
        })?;
        if text.trim().is_empty() {
            return Err(FetchError::EmptyOutput {
                path: destination.to_path_buf(),
            });
        }
        Ok(text)
    }
}
