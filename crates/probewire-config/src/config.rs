use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Every frame and inbound message.
    Trace,
    /// Submissions and acknowledgments.
    Debug,
    /// Session lifecycle and halts (default).
    #[default]
    Info,
    /// Retries exhausted, send failures.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The level name as written in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where the target lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// `host:port` of the target's debug server.
    #[serde(default)]
    pub port: Option<String>,
    /// Give up connecting after this many milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Loop periods and wait windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Outbound dispatcher wake-up period.
    #[serde(default = "default_dispatcher_tick_ms")]
    pub dispatcher_tick_ms: u64,
    /// Inbound listener wake-up period.
    #[serde(default = "default_listener_tick_ms")]
    pub listener_tick_ms: u64,
    /// How long one attempt waits for a response.
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,
    /// Pause between attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long a command waits for a background read to finish.
    #[serde(default = "default_busy_wait_ms")]
    pub busy_wait_ms: u64,
    /// Idle dispatcher ticks between background reads.
    #[serde(default = "default_poll_every_idle_ticks")]
    pub poll_every_idle_ticks: u32,
    /// Stale inbound messages discarded before a command.
    #[serde(default = "default_stale_drain_limit")]
    pub stale_drain_limit: usize,
}

fn default_dispatcher_tick_ms() -> u64 {
    150
}
fn default_listener_tick_ms() -> u64 {
    100
}
fn default_response_wait_ms() -> u64 {
    300
}
fn default_retry_backoff_ms() -> u64 {
    50
}
fn default_busy_wait_ms() -> u64 {
    500
}
fn default_poll_every_idle_ticks() -> u32 {
    2
}
fn default_stale_drain_limit() -> usize {
    100
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dispatcher_tick_ms: default_dispatcher_tick_ms(),
            listener_tick_ms: default_listener_tick_ms(),
            response_wait_ms: default_response_wait_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            busy_wait_ms: default_busy_wait_ms(),
            poll_every_idle_ticks: default_poll_every_idle_ticks(),
            stale_drain_limit: default_stale_drain_limit(),
        }
    }
}

/// Attempt budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Budget for queries, breakpoints, stop, write and reset.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Budget for continue, step and stop-debug.
    #[serde(default = "default_resume_attempts")]
    pub resume_attempts: u32,
}

fn default_attempts() -> u32 {
    3
}
fn default_resume_attempts() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            resume_attempts: default_resume_attempts(),
        }
    }
}

/// Background memory polling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Start polling watched entries as soon as a session opens.
    #[serde(default)]
    pub enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

/// Top-level probewire configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target connection.
    #[serde(default)]
    pub target: TargetConfig,
    /// Loop periods and wait windows.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Attempt budgets.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Background polling.
    #[serde(default)]
    pub poll: PollConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}
