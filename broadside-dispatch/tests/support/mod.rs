//! Scriptable in-memory transport shared by the dispatch integration tests

#![allow(dead_code, clippy::unwrap_used)]

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use broadside_dispatch::{EmailAddress, Job, Payload, Transport, TransportError};
use tokio::time::Instant;

/// One observed send.
#[derive(Debug, Clone)]
pub struct Send {
    pub recipient: String,
    pub subject: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Debug, Default)]
struct Record {
    sends: Vec<Send>,
    active: usize,
    max_active: usize,
}

/// Sleeps for a fixed latency per send and replays scripted failures per
/// recipient, oldest first. Unscripted sends succeed.
#[derive(Debug, Default)]
pub struct MockTransport {
    latency: Duration,
    script: Mutex<HashMap<String, VecDeque<TransportError>>>,
    record: Mutex<Record>,
}

impl MockTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    /// Fail the next `times` sends to `recipient` with `error`.
    #[must_use]
    pub fn fail(self, recipient: &str, error: TransportError, times: usize) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(recipient.to_string())
            .or_default()
            .extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn sends(&self) -> Vec<Send> {
        self.record.lock().unwrap().sends.clone()
    }

    pub fn max_active(&self) -> usize {
        self.record.lock().unwrap().max_active
    }

    pub fn calls_to(&self, recipient: &str) -> usize {
        self.record
            .lock()
            .unwrap()
            .sends
            .iter()
            .filter(|send| send.recipient == recipient)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, recipient: &EmailAddress, payload: &Payload) -> Result<(), TransportError> {
        let index = {
            let mut record = self.record.lock().unwrap();
            record.active += 1;
            record.max_active = record.max_active.max(record.active);
            record.sends.push(Send {
                recipient: recipient.to_string(),
                subject: payload.subject.clone(),
                started: Instant::now(),
                finished: None,
            });
            record.sends.len() - 1
        };

        tokio::time::sleep(self.latency).await;

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(recipient.as_str())
            .and_then(VecDeque::pop_front);

        let mut record = self.record.lock().unwrap();
        record.active -= 1;
        record.sends[index].finished = Some(Instant::now());

        scripted.map_or(Ok(()), Err)
    }
}

pub fn address(n: usize) -> String {
    format!("user{n}@example.com")
}

pub fn job(n: usize) -> Job {
    Job::new(
        EmailAddress::parse(&address(n)).unwrap(),
        Payload {
            subject: format!("Hello user {n}"),
            html: "<p>Hello</p>".to_string(),
            text: "Hello".to_string(),
        },
    )
}
