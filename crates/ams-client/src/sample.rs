//! Periodic sampling of the data server.
//!
//! A `Sampler` issues the same command on a fixed interval and hands every
//! timestamped response to a callback. Error responses are samples too;
//! only a broken exchange stops the loop.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ams_core::{MetricValue, Metrics};
use ams_protocol::{Command, Response};

use crate::client::DataClient;
use crate::error::Result;

/// One response together with the time it was requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub taken_at: DateTime<Utc>,
    pub command: Command,
    pub response: Response,
}

impl Sample {
    /// Renders the sample as a single line of text.
    pub fn summary(&self) -> String {
        let mut line = self.taken_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        match &self.response {
            Response::Error(message) => {
                let _ = write!(line, " error: {message}");
            }
            Response::Success(payload) => {
                let _ = write!(line, " system[{}]", render_metrics(payload.system()));
                if let Some(bus) = payload.bus() {
                    let _ = write!(line, " bus[{}]", render_metrics(bus));
                }
                if let Some(devices) = payload.devices() {
                    for (name, metrics) in devices {
                        let _ = write!(line, " {name}[{}]", render_device(metrics));
                    }
                }
            }
        }

        line
    }

    /// Renders the sample as one JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn render_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Integer(n) => n.to_string(),
        MetricValue::Text(s) => s.clone(),
        MetricValue::Absent => "-".to_string(),
    }
}

fn render_metrics(metrics: &Metrics) -> String {
    metrics
        .iter()
        .map(|(key, value)| format!("{key}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

// The device name is already the label.
fn render_device(metrics: &Metrics) -> String {
    metrics
        .iter()
        .filter(|(key, _)| key.as_str() != "name")
        .map(|(key, value)| format!("{key}={}", render_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shortest polling period; a zero period is raised to this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Polls the server with one command at a fixed interval.
#[derive(Debug, Clone)]
pub struct Sampler {
    client: DataClient,
    command: Command,
    period: Duration,
}

impl Sampler {
    pub fn new(client: DataClient, command: Command, period: Duration) -> Self {
        Self {
            client,
            command,
            period: period.max(MIN_PERIOD),
        }
    }

    /// Takes one sample now.
    pub async fn sample(&self) -> Result<Sample> {
        let taken_at = Utc::now();
        let response = self.client.fetch(self.command).await?;
        if let Some(message) = response.error_message() {
            debug!(command = %self.command, error = message, "Server returned an error");
        }
        Ok(Sample {
            taken_at,
            command: self.command,
            response,
        })
    }

    /// Samples until `limit` samples were taken (0 means no limit) or the
    /// token is cancelled.
    ///
    /// Returns the number of samples taken. The first sample is taken
    /// immediately.
    pub async fn run<F>(&self, limit: u64, cancel: &CancellationToken, mut on_sample: F) -> Result<u64>
    where
        F: FnMut(&Sample),
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut taken = 0;

        while limit == 0 || taken < limit {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(taken, "Sampling cancelled");
                    break;
                }

                _ = ticker.tick() => {}
            }

            let sample = self.sample().await?;
            on_sample(&sample);
            taken += 1;
        }

        Ok(taken)
    }
}
