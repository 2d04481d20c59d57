//! Live `docker events` as a stream of typed records
//!
//! Each [`EventWatcher::watch`] call starts its own `docker events` process and
//! its own bounded channel. A decoder task turns every output line into a
//! [`DockerEvent`]; lines that are not valid event JSON are skipped. When the
//! channel is full the decoder waits, so no event is dropped. The stream ends
//! when the process exits or the caller's token is cancelled, and dropping the
//! [`EventStream`] terminates the process.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::cli::DockerCli;
use crate::subprocess::{LineBuffer, WaitHandle};

/// Swarm labels docker attaches to container and service events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorAttributes {
    #[serde(rename = "com.docker.swarm.node.id")]
    pub swarm_node_id: String,
    #[serde(rename = "com.docker.swarm.service.id")]
    pub swarm_service_id: String,
    #[serde(rename = "com.docker.swarm.service.name")]
    pub swarm_service_name: String,
    #[serde(rename = "com.docker.swarm.task")]
    pub swarm_task: String,
    #[serde(rename = "com.docker.swarm.task.id")]
    pub swarm_task_id: String,
    #[serde(rename = "com.docker.swarm.task.name")]
    pub swarm_task_name: String,
    pub image: String,
    pub name: String,
    /// Every other attribute, verbatim
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventActor {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Attributes")]
    pub attributes: ActorAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerEvent {
    pub status: String,
    pub id: String,
    /// Image the entity was created from
    pub from: String,
    #[serde(rename = "Type")]
    pub event_type: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Actor")]
    pub actor: EventActor,
    pub scope: String,
    /// Seconds since the epoch
    pub time: i64,
    #[serde(rename = "timeNano")]
    pub time_nano: i64,
}

impl DockerEvent {
    /// Decode one line of `docker events --format '{{json .}}'`
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::trace!("Skipping undecodable event line ({}): {}", e, line);
                None
            }
        }
    }
}

/// `--filter` and `--since` arguments of `docker events`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    filters: Vec<(String, String)>,
    since: Option<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn event_type(self, event_type: impl Into<String>) -> Self {
        self.with("type", event_type)
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, value) in &self.filters {
            args.push("--filter".to_string());
            args.push(format!("{}={}", key, value));
        }
        if let Some(since) = &self.since {
            args.push("--since".to_string());
            args.push(since.clone());
        }
        args
    }
}

#[derive(Clone)]
pub struct EventWatcher {
    cli: DockerCli,
}

impl EventWatcher {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    /// Start a fresh `docker events` process feeding a fresh channel
    pub fn watch(&self, filter: &EventFilter, cancel: CancellationToken) -> EventStream {
        let mut args = vec![
            "events".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        args.extend(filter.args());

        let process_token = cancel.child_token();
        let command = self
            .cli
            .streaming(&args)
            .cancel_on(process_token.clone())
            .build();
        let (output, exit) = self.cli.spawn(command).into_parts();

        let (tx, rx) = mpsc::channel(self.cli.config().event_buffer.max(1));
        tokio::spawn(decode_events(output, tx));

        EventStream {
            rx,
            exit,
            token: process_token.clone(),
            _guard: process_token.drop_guard(),
        }
    }
}

async fn decode_events(mut output: LineBuffer, tx: mpsc::Sender<DockerEvent>) {
    let mut delivered = 0usize;
    while let Some(line) = output.next_line().await {
        let Some(event) = DockerEvent::from_line(&line) else {
            continue;
        };
        // Waits while the consumer is behind
        if tx.send(event).await.is_err() {
            tracing::debug!("Event consumer went away after {} events", delivered);
            return;
        }
        delivered += 1;
    }
    tracing::debug!("Event process closed its output after {} events", delivered);
}

/// Decoded events of one `docker events` process
pub struct EventStream {
    rx: mpsc::Receiver<DockerEvent>,
    exit: WaitHandle,
    token: CancellationToken,
    _guard: DropGuard,
}

impl EventStream {
    /// Next event, or `None` once the process has ended and every event was handed out
    pub async fn next_event(&mut self) -> Option<DockerEvent> {
        self.rx.recv().await
    }

    /// Terminate the underlying process; buffered events can still be read
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Exit report of the underlying process
    pub fn exit(&self) -> WaitHandle {
        self.exit.clone()
    }
}

impl Stream for EventStream {
    type Item = DockerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
