use crate::config::CrawlerConfig;
use crate::{Result, SentinelError};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one crawl run
///
/// `Init -> Running -> Draining -> Terminated`, with `Running -> Terminated`
/// for a run that empties its frontier without hitting a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Seed resolved, frontier seeded
    Init,

    /// Workers are pulling from the frontier
    Running,

    /// Shutdown requested; remaining frontier is being snapshotted
    Draining,

    /// Run is over
    Terminated,
}

impl RunPhase {
    /// Returns true if the run may move from `self` to `next`
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Running, Self::Terminated)
                | (Self::Draining, Self::Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

/// Why a run stopped before its frontier was empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// `max_profiles_to_process` reached
    ProfileLimit,

    /// `max_processing_time_minutes` reached
    TimeLimit,
}

impl ShutdownReason {
    /// Converts the reason to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ProfileLimit => "profile_limit",
            Self::TimeLimit => "time_limit",
        }
    }

    /// Parses a reason from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "profile_limit" => Some(Self::ProfileLimit),
            "time_limit" => Some(Self::TimeLimit),
            _ => None,
        }
    }

    /// Operator-facing description of how the run ended
    pub fn exit_reason(reason: Option<Self>) -> &'static str {
        match reason {
            None => "queue cleared",
            Some(Self::ProfileLimit) => "profile threshold reached",
            Some(Self::TimeLimit) => "runtime threshold reached",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Operator-configured bounds on a run; zero means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub max_profiles: u64,
    pub max_duration: Option<Duration>,
}

impl ThresholdPolicy {
    pub fn unlimited() -> Self {
        Self {
            max_profiles: 0,
            max_duration: None,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_profiles: config.max_profiles_to_process,
            max_duration: config.max_processing_time(),
        }
    }

    /// Returns true if processing one more profile would exceed the profile bound
    pub fn profile_limit_reached(&self, processed: u64) -> bool {
        self.max_profiles != 0 && processed >= self.max_profiles
    }

    pub fn time_limit_reached(&self, elapsed: Duration) -> bool {
        self.max_duration
            .map(|limit| elapsed >= limit)
            .unwrap_or(false)
    }

    /// Checks both bounds, profile count first
    pub fn check(&self, processed: u64, elapsed: Duration) -> Option<ShutdownReason> {
        if self.profile_limit_reached(processed) {
            Some(ShutdownReason::ProfileLimit)
        } else if self.time_limit_reached(elapsed) {
            Some(ShutdownReason::TimeLimit)
        } else {
            None
        }
    }
}

/// Process-local state of one crawl run
///
/// Shared by the orchestrator and every worker. The first shutdown request
/// wins; later requests keep the original reason.
#[derive(Debug)]
pub struct RunState {
    started: Instant,
    shutdown: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
    phase: Mutex<RunPhase>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            shutdown: CancellationToken::new(),
            reason: Mutex::new(None),
            phase: Mutex::new(RunPhase::Init),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Token cancelled once shutdown is requested
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Requests shutdown, returning true if this call set the reason
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        let mut current = self.reason.lock().unwrap_or_else(|e| e.into_inner());
        let first = current.is_none();
        if first {
            *current = Some(reason);
            tracing::info!(reason = %reason, elapsed = ?self.elapsed(), "Shutdown requested");
        }
        drop(current);

        self.shutdown.cancel();
        first
    }

    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves the run to `next`, rejecting transitions outside the lifecycle
    pub fn transition(&self, next: RunPhase) -> Result<()> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        let from = *phase;
        if !from.can_transition_to(next) {
            return Err(SentinelError::InvalidTransition { from, to: next });
        }

        tracing::debug!(from = %from, to = %next, "Run phase transition");
        *phase = next;
        Ok(())
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
