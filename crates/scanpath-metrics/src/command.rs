//! External-process metric bridge
//!
//! The reference implementations of the scanpath, saliency and caption
//! metrics are not Rust libraries. [`CommandMetrics`] runs a scorer command
//! once per call, writes a JSON request to its stdin and reads a JSON reply
//! from its stdout:
//!
//! ```text
//! stdin : {"family": "scanpath", "payload": [ScanpathRequest, ...]}
//! stdout: [ScanpathScores, ...]
//!
//! stdin : {"family": "saliency", "payload": {"groups": {key: SaliencyGroup}}}
//! stdout: {key: SaliencyScores}
//!
//! stdin : {"family": "caption", "payload": {"references": {...}, "candidates": {...}}}
//! stdout: {key: CaptionScores}
//! ```

use crate::adapters::{
    ensure_keys, CaptionMetric, MetricFamily, SaliencyGroup, SaliencyMetric, ScanpathMetric,
    ScanpathRequest,
};
use crate::error::MetricError;
use crate::scores::{CaptionScores, SaliencyScores, ScanpathScores};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Serialize)]
struct Request<'a, P: Serialize> {
    family: MetricFamily,
    payload: &'a P,
}

#[derive(Serialize)]
struct SaliencyPayload<'a> {
    groups: &'a BTreeMap<String, SaliencyGroup>,
}

#[derive(Serialize)]
struct CaptionPayload<'a> {
    references: &'a BTreeMap<String, Vec<String>>,
    candidates: &'a BTreeMap<String, Vec<String>>,
}

/// Metric adapter backed by an external scorer process
#[derive(Debug, Clone)]
pub struct CommandMetrics {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
}

impl CommandMetrics {
    /// Create a bridge from an argv vector (`program`, `args...`)
    pub fn new<I, S>(argv: I) -> Result<Self, MetricError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(MetricError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
            working_dir: None,
            env_vars: Vec::new(),
        })
    }

    /// Run the scorer in this directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the scorer process
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line, for error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn call<P, R>(&self, family: MetricFamily, payload: &P) -> Result<R, MetricError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let body = serde_json::to_vec(&Request { family, payload })
            .map_err(|source| MetricError::Protocol { family, source })?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let spawn_error = |source: std::io::Error| MetricError::Spawn {
            family,
            command: self.command_line(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;

        // Feed stdin from a separate thread so a scorer that starts writing
        // before it has read the whole request cannot block us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin was not captured")))?;
        let writer = std::thread::spawn(move || stdin.write_all(&body));

        let output = child.wait_with_output().map_err(spawn_error)?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));

        if !output.status.success() {
            return Err(MetricError::Failed {
                family,
                command: self.command_line(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(spawn_error)?;

        tracing::debug!(
            %family,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "metric scorer finished"
        );

        serde_json::from_slice(&output.stdout)
            .map_err(|source| MetricError::Protocol { family, source })
    }
}

impl ScanpathMetric for CommandMetrics {
    fn score_batch(&self, requests: &[ScanpathRequest]) -> Result<Vec<ScanpathScores>, MetricError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let family = MetricFamily::Scanpath;
        let scores: Vec<ScanpathScores> = self.call(family, &requests)?;
        if scores.len() != requests.len() {
            return Err(MetricError::LengthMismatch {
                family,
                expected: requests.len(),
                actual: scores.len(),
            });
        }
        Ok(scores)
    }
}

impl SaliencyMetric for CommandMetrics {
    fn score_saliency(
        &self,
        groups: &BTreeMap<String, SaliencyGroup>,
    ) -> Result<BTreeMap<String, SaliencyScores>, MetricError> {
        if groups.is_empty() {
            return Ok(BTreeMap::new());
        }
        let family = MetricFamily::Saliency;
        let scores: BTreeMap<String, SaliencyScores> =
            self.call(family, &SaliencyPayload { groups })?;
        ensure_keys(family, groups, &scores)?;
        Ok(scores)
    }
}

impl CaptionMetric for CommandMetrics {
    fn score_captions(
        &self,
        references: &BTreeMap<String, Vec<String>>,
        candidates: &BTreeMap<String, Vec<String>>,
    ) -> Result<BTreeMap<String, CaptionScores>, MetricError> {
        if candidates.is_empty() {
            return Ok(BTreeMap::new());
        }
        let family = MetricFamily::Caption;
        let scores: BTreeMap<String, CaptionScores> = self.call(
            family,
            &CaptionPayload {
                references,
                candidates,
            },
        )?;
        ensure_keys(family, candidates, &scores)?;
        Ok(scores)
    }
}
