//! Explicit run context threaded through every component.
//!
//! Nothing in the pipeline reads ambient state: the working directories,
//! timeouts, concurrency bound, cancellation token, and resolved credentials
//! all live here and are fixed before the first step runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials;
use crate::error::Result;
use crate::plan::Plan;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
const MAX_WORKERS: usize = 8;

/// Cooperative cancellation flag shared between the caller and the runner.
///
/// Observed at step boundaries and inside per-item worker loops; in-flight
/// external processes are still bounded by the command timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Credentials for one publish destination, resolved once before the run.
#[derive(Debug, Clone, Default)]
pub struct PublishCredentials {
    pub api_key: Option<String>,
    pub credential: Option<String>,
}

/// Immutable per-run context.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub temp_root: PathBuf,
    pub command_timeout: Duration,
    pub concurrency: usize,
    pub cancel: CancelToken,
    /// One entry per publish segment, in plan order.
    pub publish_credentials: Vec<PublishCredentials>,
}

impl RunContext {
    /// Build a context for a plan, resolving every publish credential up
    /// front so no step touches the environment or keychain mid-run.
    pub fn for_plan(plan: &Plan) -> Result<Self> {
        let mut publish_credentials = Vec::with_capacity(plan.publishes.len());
        for (index, publish) in plan.publishes.iter().enumerate() {
            publish_credentials.push(PublishCredentials {
                api_key: credentials::resolve_optional(
                    publish.api_key.as_ref(),
                    &format!("segments.publish[{}].apiKey", index),
                )?,
                credential: credentials::resolve_optional(
                    publish.credential.as_ref(),
                    &format!("segments.publish[{}].credential", index),
                )?,
            });
        }

        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            temp_root: std::env::temp_dir(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            concurrency: default_concurrency(),
            cancel: CancelToken::new(),
            publish_credentials,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .min(MAX_WORKERS)
}
