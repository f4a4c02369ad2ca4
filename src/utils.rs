use std::thread::sleep;
use std::time::Duration;

use anyhow::{bail, Result};
use indicatif::ProgressStyle;
use tracing::warn;
use ureq::{Agent, AgentBuilder, Response};

use crate::config::NetworkConfig;

pub fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{percent}% {pos}/{len} ({eta_precise}) {msg}").expect("hardcoded")
}

/// Blocking HTTP client that retries transient failures with exponential
/// backoff.
pub struct Http {
    agent: Agent,
    retries: u32,
    backoff: Duration,
}

impl Http {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            agent: AgentBuilder::new()
                .timeout(config.timeout)
                .user_agent(&config.user_agent)
                .build(),
            retries: config.retries,
            backoff: config.backoff,
        }
    }

    /// Runs `request` until it succeeds, fails permanently, or runs out of
    /// retries. Transport errors, 429 and 5xx are transient.
    pub fn send(
        &self,
        what: &str,
        request: impl Fn(&Agent) -> Result<Response, ureq::Error>,
    ) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let error = match request(&self.agent) {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            if !is_transient(&error) {
                bail!("{what} failed: {error}");
            }
            if attempt >= self.retries {
                bail!("{what} failed after {} attempts: {error}", attempt + 1);
            }

            let delay = backoff(self.backoff, attempt);
            warn!("{what} failed ({error}), retrying in {delay:?}");
            sleep(delay);
            attempt += 1;
        }
    }
}

fn is_transient(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn http(retries: u32) -> Http {
        Http::new(&NetworkConfig {
            retries,
            backoff: Duration::ZERO,
            ..NetworkConfig::default()
        })
    }

    fn status(code: u16) -> ureq::Error {
        let response = Response::new(code, "status", "").unwrap();
        ureq::Error::Status(code, response)
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 0), base);
        assert_eq!(backoff(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn retries_transient_errors_then_gives_up() {
        let calls = Cell::new(0);
        let result = http(2).send("overpass query", |_| {
            calls.set(calls.get() + 1);
            Err(status(503))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn recovers_after_transient_error() {
        let calls = Cell::new(0);
        let result = http(2).send("overpass query", |_| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(status(429))
            } else {
                Ok(Response::new(200, "OK", "{}").unwrap())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result = http(5).send("nominatim search", |_| {
            calls.set(calls.get() + 1);
            Err(status(400))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
