//! JSON shapes of the external hall request assigner, and the subprocess that runs it.
//!
//! The assigner is an executable taking `-i <json> --includeCab` and printing a JSON object that
//! maps every elevator ID to its full `[floor][button]` order matrix.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
// Library for executing terminal commands
use tokio::process::Command;

use crate::config;
use crate::world_view::OrderMatrix;

/// One elevator as the assigner sees it.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevatorStateJson {
    /// `"idle"`, `"moving"` or `"doorOpen"`
    pub behaviour: String,
    pub floor: i32,
    /// `"up"`, `"down"` or `"stop"`
    pub direction: String,
    pub cabRequests: Vec<bool>,
}

/// Assigner input.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignerInput {
    /// `[floor] = [up, down]`, true for calls still being negotiated.
    pub hallRequests: Vec<[bool; 2]>,
    pub states: BTreeMap<String, ElevatorStateJson>,
}

/// Assigner output: elevator ID → order matrix.
pub type AssignerOutput = HashMap<String, OrderMatrix>;

/// Distributes open hall calls over the available elevators.
pub trait HallRequestAssigner: Send + Sync {
    /// Runs one assignment.
    fn assign(&self, input: &AssignerInput) -> impl Future<Output = anyhow::Result<AssignerOutput>> + Send;
}

/// [`HallRequestAssigner`] backed by the `hall_request_assigner` executable.
#[derive(Debug, Clone)]
pub struct ExecutableAssigner {
    path: PathBuf,
    timeout: Duration,
}

impl ExecutableAssigner {
    /// Uses the executable at `path`, giving up after [`config::SOLVER_TIMEOUT`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExecutableAssigner { path: path.into(), timeout: config::SOLVER_TIMEOUT }
    }
}

impl HallRequestAssigner for ExecutableAssigner {
    fn assign(&self, input: &AssignerInput) -> impl Future<Output = anyhow::Result<AssignerOutput>> + Send {
        let json = serde_json::to_string(input);
        let path = self.path.clone();
        let timeout = self.timeout;

        async move {
            let json = json.context("could not serialize assigner input")?;
            let run = Command::new(&path)
                .arg("-i")
                .arg(&json)
                .arg("--includeCab")
                .kill_on_drop(true)
                .output();

            let output = tokio::time::timeout(timeout, run)
                .await
                .map_err(|_| anyhow!("{} did not answer within {:?}", path.display(), timeout))?
                .with_context(|| format!("could not start {}", path.display()))?;

            if !output.status.success() {
                bail!(
                    "{} exited with {}: {}",
                    path.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            parse_output(&output.stdout)
        }
    }
}

/// Decodes the assigner's stdout.
pub fn parse_output(stdout: &[u8]) -> anyhow::Result<AssignerOutput> {
    serde_json::from_slice(stdout).context("assigner printed something that is not an assignment")
}
