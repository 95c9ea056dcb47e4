use std::time::Duration;

use probewire_config::Config;

/// Timing and retry parameters of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Outbound dispatcher period.
    pub dispatcher_tick: Duration,
    /// Inbound listener period.
    pub listener_tick: Duration,
    /// Response window of one attempt.
    pub response_wait: Duration,
    /// Pause before the acknowledgment that closes a failed attempt.
    pub retry_backoff: Duration,
    /// How long a command waits for a background read to finish.
    pub busy_wait: Duration,
    /// Idle dispatcher ticks between background reads.
    pub poll_every_idle_ticks: u32,
    /// Maximum stale messages discarded before a request.
    pub stale_drain_limit: usize,
    /// Attempt budget for queries, breakpoints, stop, write and reset.
    pub attempts: u32,
    /// Attempt budget for continue, step and stop-debug.
    pub resume_attempts: u32,
    /// Connection timeout for the transport.
    pub connect_timeout: Duration,
    /// Background polling state at session start.
    pub poll_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineOptions {
    /// Convert loaded configuration into engine options.
    pub fn from_config(config: &Config) -> Self {
        let timing = &config.timing;
        Self {
            dispatcher_tick: Duration::from_millis(timing.dispatcher_tick_ms),
            listener_tick: Duration::from_millis(timing.listener_tick_ms),
            response_wait: Duration::from_millis(timing.response_wait_ms),
            retry_backoff: Duration::from_millis(timing.retry_backoff_ms),
            busy_wait: Duration::from_millis(timing.busy_wait_ms),
            poll_every_idle_ticks: timing.poll_every_idle_ticks.max(1),
            stale_drain_limit: timing.stale_drain_limit,
            attempts: config.retry.attempts.max(1),
            resume_attempts: config.retry.resume_attempts.max(1),
            connect_timeout: Duration::from_millis(config.target.connect_timeout_ms),
            poll_enabled: config.poll.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config_defaults() {
        let opts = EngineOptions::default();
        assert_eq!(opts.dispatcher_tick, Duration::from_millis(150));
        assert_eq!(opts.listener_tick, Duration::from_millis(100));
        assert_eq!(opts.response_wait, Duration::from_millis(300));
        assert_eq!(opts.retry_backoff, Duration::from_millis(50));
        assert_eq!(opts.busy_wait, Duration::from_millis(500));
        assert_eq!(opts.poll_every_idle_ticks, 2);
        assert_eq!(opts.stale_drain_limit, 100);
        assert_eq!(opts.attempts, 3);
        assert_eq!(opts.resume_attempts, 1);
        assert_eq!(opts.connect_timeout, Duration::from_secs(2));
        assert!(!opts.poll_enabled);
    }

    #[test]
    fn from_config_applies_overrides() {
        let mut config = Config::default();
        config.timing.response_wait_ms = 800;
        config.retry.attempts = 5;
        config.poll.enabled = true;

        let opts = EngineOptions::from_config(&config);
        assert_eq!(opts.response_wait, Duration::from_millis(800));
        assert_eq!(opts.attempts, 5);
        assert!(opts.poll_enabled);
    }
}
