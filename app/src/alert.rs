use std::error::Error;
use std::fmt;
use std::time::Duration;

use ureq::{Agent, AgentBuilder};

/// Why an alert did not reach its endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDeliveryFault {
    /// The endpoint answered with something other than 2xx.
    Status(u16),
    Transport(String),
}

impl fmt::Display for AlertDeliveryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDeliveryFault::Status(code) => write!(f, "alert rejected with status {}", code),
            AlertDeliveryFault::Transport(err) => write!(f, "alert not delivered: {}", err),
        }
    }
}

impl Error for AlertDeliveryFault {}

/// Outbound notification channel. One attempt per call, no retries.
pub trait AlertSink {
    fn send(&self, message: &str) -> Result<(), AlertDeliveryFault>;
}

/// Posts the alert as a plain text body to a single URL.
pub struct WebhookSink {
    agent: Agent,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = AgentBuilder::new().timeout(timeout).build();
        WebhookSink { agent, url }
    }
}

impl AlertSink for WebhookSink {
    fn send(&self, message: &str) -> Result<(), AlertDeliveryFault> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "text/plain; charset=utf-8")
            .send_string(message);
        match response {
            Ok(response) if (200..300).contains(&response.status()) => Ok(()),
            Ok(response) => Err(AlertDeliveryFault::Status(response.status())),
            Err(ureq::Error::Status(code, _)) => Err(AlertDeliveryFault::Status(code)),
            Err(ureq::Error::Transport(err)) => Err(AlertDeliveryFault::Transport(err.to_string())),
        }
    }
}

/// Text of the alert sent once the door has been open longer than `threshold`.
pub fn open_too_long_message(threshold: Duration) -> String {
    format!(
        "Garage door has been open for more than {}",
        exact_duration(threshold)
    )
}

// Whole seconds spelled out without rounding, e.g. "1 hour 30 minutes".
fn exact_duration(duration: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(86400, "day"), (3600, "hour"), (60, "minute"), (1, "second")];

    let mut remaining = duration.as_secs();
    if remaining == 0 {
        return "0 seconds".to_string();
    }
    let mut parts = Vec::new();
    for &(size, unit) in UNITS.iter() {
        let count = remaining / size;
        remaining %= size;
        match count {
            0 => {}
            1 => parts.push(format!("1 {}", unit)),
            n => parts.push(format!("{} {}s", n, unit)),
        }
    }
    parts.join(" ")
}
