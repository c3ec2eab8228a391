//! Bounded interactive acquisition through a real browser session.
//!
//! The agent observes the page, asks a [`DecisionOracle`] for the next action
//! and performs it, for at most [`AGENT_STEP_BUDGET`] steps. Downloads land in
//! a private temporary directory next to the destination; a file that appears
//! there (set difference against the previous listing) is moved into place and
//! validated.
//!
//! The browser and the oracle are injected. Both the session and the temporary
//! directory are released on every exit path before control returns to the
//! chain.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{AcquireError, AttemptContext, Strategy, StrategyOutcome};
use crate::download::DownloadError;
use crate::record::Record;

const NAME: &str = "Interactive agent";

/// Maximum number of observe/act iterations.
pub const AGENT_STEP_BUDGET: usize = 5;

/// Pause after each click before the page is observed again.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Step instruction for the first observation.
const OPENING_STEP: &str = "Find and click the primary link or button to access the PDF.";

/// Step instruction after a click that went through.
const AFTER_CLICK_STEP: &str = "I have clicked the element. What is the next step?";

/// Step instruction after an unparsable reply.
const AFTER_INVALID_STEP: &str = "Invalid action. Please re-evaluate the page.";

/// Suffixes of browser download placeholders that are still being written.
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

/// An action proposed by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
    /// Click the element addressed by the target (XPath or selector).
    Click(String),
    /// The oracle believes the download finished.
    DownloadComplete,
    /// The oracle gives up.
    Fail(String),
    /// The reply could not be understood; carries the raw text.
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action: String,
    #[serde(alias = "xpath", alias = "selector")]
    target: Option<String>,
    reason: Option<String>,
}

/// Parses an oracle reply, tolerating Markdown code fences around the JSON.
#[must_use]
pub fn parse_agent_action(reply: &str) -> AgentAction {
    let body = strip_code_fences(reply);
    let Ok(raw) = serde_json::from_str::<RawAction>(body) else {
        return AgentAction::Invalid(reply.to_string());
    };
    match raw.action.trim().to_ascii_uppercase().as_str() {
        "CLICK" => match raw.target.map(|t| t.trim().to_string()) {
            Some(target) if !target.is_empty() => AgentAction::Click(target),
            _ => AgentAction::Invalid(reply.to_string()),
        },
        "DOWNLOAD_COMPLETE" => AgentAction::DownloadComplete,
        "FAIL" => AgentAction::Fail(
            raw.reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "no reason given".to_string()),
        ),
        _ => AgentAction::Invalid(reply.to_string()),
    }
}

fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().trim_end_matches("```").trim()
}

/// Chooses the next action from a screenshot.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Returns the next action for the current page.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Oracle`] when the oracle cannot be reached.
    async fn next_action(&self, screenshot: &[u8], instruction: &str)
    -> Result<AgentAction, AcquireError>;
}

/// A live browser tab.
#[async_trait]
pub trait BrowserSession: Send {
    /// Captures the current page as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Browser`] on driver failures.
    async fn screenshot(&mut self) -> Result<Vec<u8>, AcquireError>;

    /// Clicks the element addressed by `target`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Browser`] when the element cannot be clicked.
    async fn click(&mut self, target: &str) -> Result<(), AcquireError>;

    /// Closes the session. Called exactly once.
    async fn close(self: Box<Self>);
}

/// Opens browser sessions that save downloads into a given directory.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Opens `start_url` with downloads directed to `download_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Browser`] when the browser cannot start.
    async fn launch(
        &self,
        start_url: &str,
        download_dir: &Path,
    ) -> Result<Box<dyn BrowserSession>, AcquireError>;
}

/// How a bounded agent run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// A new file appeared in the download directory.
    Done(PathBuf),
    /// The oracle or the browser gave up.
    Failed(String),
    /// The step budget ran out.
    BudgetExhausted,
}

/// Strategy 6: browser-driven last resort.
pub struct AgentStrategy {
    launcher: Arc<dyn BrowserLauncher>,
    oracle: Arc<dyn DecisionOracle>,
    doi_base_url: String,
    step_budget: usize,
    settle_delay: Duration,
}

impl AgentStrategy {
    /// Creates the strategy. Identifier-only records start at `{doi_base_url}/{doi}`.
    #[must_use]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        oracle: Arc<dyn DecisionOracle>,
        doi_base_url: &str,
    ) -> Self {
        Self {
            launcher,
            oracle,
            doi_base_url: doi_base_url.trim_end_matches('/').to_string(),
            step_budget: AGENT_STEP_BUDGET,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Lowers the step budget; values above [`AGENT_STEP_BUDGET`] are capped.
    #[must_use]
    pub fn with_step_budget(mut self, steps: usize) -> Self {
        self.step_budget = steps.min(AGENT_STEP_BUDGET);
        self
    }

    fn start_url(&self, record: &Record) -> Option<String> {
        record
            .origin_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .map(ToString::to_string)
            .or_else(|| {
                record
                    .identifier
                    .as_deref()
                    .map(|doi| format!("{}/{doi}", self.doi_base_url))
            })
    }

    /// The goal and reply format, repeated on every step.
    fn brief(record: &Record) -> String {
        let doi = record.identifier.as_deref().unwrap_or("unknown");
        format!(
            "You control a web browser. Goal: download the PDF of the paper titled \"{}\" (DOI: {doi}). \
             Look at the screenshot and reply with JSON only, one of: \
             {{\"action\": \"CLICK\", \"xpath\": \"<xpath of the element to click>\"}}, \
             {{\"action\": \"DOWNLOAD_COMPLETE\"}} once the download has started, or \
             {{\"action\": \"FAIL\", \"reason\": \"<why>\"}} if the PDF is not reachable.",
            record.title_str()
        )
    }

    /// Runs the observe/act loop against an open session.
    ///
    /// Each oracle call carries `brief` plus an instruction describing how the
    /// previous step went.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        download_dir: &Path,
        brief: &str,
    ) -> AgentOutcome {
        let mut known = list_files(download_dir).await;
        let mut step_instruction = OPENING_STEP.to_string();

        for step in 1..=self.step_budget {
            let screenshot = match session.screenshot().await {
                Ok(bytes) => bytes,
                Err(err) => return AgentOutcome::Failed(err.to_string()),
            };
            let prompt = format!("{brief}\nInstruction: {step_instruction}");
            let action = match self.oracle.next_action(&screenshot, &prompt).await {
                Ok(action) => action,
                Err(err) => return AgentOutcome::Failed(err.to_string()),
            };
            debug!(step, ?action, "agent step");

            match action {
                AgentAction::Click(target) => {
                    step_instruction = match session.click(&target).await {
                        Ok(()) => AFTER_CLICK_STEP.to_string(),
                        Err(err) => {
                            debug!(step, %err, "click failed; observing again");
                            format!(
                                "Clicking the XPath failed: {err}. Please find a new element to click."
                            )
                        }
                    };
                    tokio::time::sleep(self.settle_delay).await;
                    let current = list_files(download_dir).await;
                    if let Some(path) = newest_complete(&current, &known) {
                        return AgentOutcome::Done(path);
                    }
                    known = current;
                }
                AgentAction::DownloadComplete => {
                    tokio::time::sleep(self.settle_delay).await;
                    let current = list_files(download_dir).await;
                    return match newest_complete(&current, &known) {
                        Some(path) => AgentOutcome::Done(path),
                        None => AgentOutcome::Failed(
                            "download reported complete but no file appeared".to_string(),
                        ),
                    };
                }
                AgentAction::Fail(reason) => return AgentOutcome::Failed(reason),
                AgentAction::Invalid(raw) => {
                    debug!(step, reply = %raw, "unparsable oracle reply; observing again");
                    step_instruction = AFTER_INVALID_STEP.to_string();
                }
            }
        }
        AgentOutcome::BudgetExhausted
    }
}

impl std::fmt::Debug for AgentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStrategy")
            .field("step_budget", &self.step_budget)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Strategy for AgentStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn can_attempt(&self, record: &Record) -> bool {
        self.start_url(record).is_some()
    }

    #[tracing::instrument(skip_all, fields(strategy = NAME))]
    async fn attempt(
        &self,
        record: &Record,
        ctx: &AttemptContext,
    ) -> Result<StrategyOutcome, AcquireError> {
        let Some(start_url) = self.start_url(record) else {
            return Ok(StrategyOutcome::Skipped);
        };
        let parent = ctx.destination().parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".paperbot-agent-")
            .tempdir_in(parent)
            .map_err(|e| AcquireError::storage(NAME, DownloadError::io(parent, e)))?;

        let mut session = self.launcher.launch(&start_url, scratch.path()).await?;
        let outcome = self
            .drive(session.as_mut(), scratch.path(), &Self::brief(record))
            .await;
        session.close().await;

        let result = match outcome {
            AgentOutcome::Done(path) => {
                info!(file = %path.display(), "agent produced a file");
                ctx.commit_file(NAME, &path).await
            }
            AgentOutcome::Failed(reason) => {
                debug!(%reason, "agent failed");
                Ok(StrategyOutcome::NotFound)
            }
            AgentOutcome::BudgetExhausted => {
                debug!(budget = self.step_budget, "agent step budget exhausted");
                Ok(StrategyOutcome::NotFound)
            }
        };

        if let Err(error) = scratch.close() {
            warn!(%error, "could not remove agent download directory");
        }
        result
    }
}

async fn list_files(dir: &Path) -> HashSet<PathBuf> {
    let mut files = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.insert(entry.path());
        }
    }
    files
}

/// A file present in `current` but not in `known`, ignoring partial downloads.
fn newest_complete(current: &HashSet<PathBuf>, known: &HashSet<PathBuf>) -> Option<PathBuf> {
    let mut fresh: Vec<&PathBuf> = current
        .difference(known)
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            !PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        })
        .collect();
    fresh.sort();
    fresh.first().map(|path| (*path).clone())
}
