use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provision::api::{ProvisionalRequestId, ResourceId};
use crate::provision::result::AllocationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    AttemptStarted {
        name: String,
        attempt: u32,
        max_attempts: u32,
        allocation: AllocationKind,
    },
    AttemptFailed {
        name: String,
        attempt: u32,
        error: String,
    },
    RequestCancelled {
        name: String,
        request_id: ProvisionalRequestId,
        success: bool,
    },
    BackoffWait {
        name: String,
        attempt: u32,
        delay: Duration,
    },
    TaggingFailed {
        name: String,
        resources: Vec<String>,
        error: String,
    },
    ResourceAcquired {
        name: String,
        resource_id: ResourceId,
        attempts: u32,
    },
    AcquisitionFailed {
        name: String,
        attempts: u32,
        error: String,
    },
    ResourceTerminated {
        resource_id: ResourceId,
        success: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Receiver of provisioning events.
pub trait EventSink {
    fn on_event(&self, event: &Event);
}

/// Passes events to an optional sink. Without a sink, events are dropped.
#[derive(Clone, Default)]
pub struct EventStreamer {
    sink: Option<Rc<dyn EventSink>>,
}

impl EventStreamer {
    pub fn new(sink: Option<Rc<dyn EventSink>>) -> Self {
        Self { sink }
    }

    pub fn on_attempt_started(
        &self,
        name: &str,
        attempt: u32,
        max_attempts: u32,
        allocation: AllocationKind,
    ) {
        self.send_event(EventPayload::AttemptStarted {
            name: name.to_string(),
            attempt,
            max_attempts,
            allocation,
        });
    }

    pub fn on_attempt_failed(&self, name: &str, attempt: u32, error: String) {
        self.send_event(EventPayload::AttemptFailed {
            name: name.to_string(),
            attempt,
            error,
        });
    }

    pub fn on_request_cancelled(&self, name: &str, request_id: &str, success: bool) {
        self.send_event(EventPayload::RequestCancelled {
            name: name.to_string(),
            request_id: request_id.to_string(),
            success,
        });
    }

    pub fn on_backoff(&self, name: &str, attempt: u32, delay: Duration) {
        self.send_event(EventPayload::BackoffWait {
            name: name.to_string(),
            attempt,
            delay,
        });
    }

    pub fn on_tagging_failed(&self, name: &str, resources: &[String], error: String) {
        self.send_event(EventPayload::TaggingFailed {
            name: name.to_string(),
            resources: resources.to_vec(),
            error,
        });
    }

    pub fn on_resource_acquired(&self, name: &str, resource_id: &str, attempts: u32) {
        self.send_event(EventPayload::ResourceAcquired {
            name: name.to_string(),
            resource_id: resource_id.to_string(),
            attempts,
        });
    }

    pub fn on_acquisition_failed(&self, name: &str, attempts: u32, error: String) {
        self.send_event(EventPayload::AcquisitionFailed {
            name: name.to_string(),
            attempts,
            error,
        });
    }

    pub fn on_resource_terminated(&self, resource_id: &str, success: bool) {
        self.send_event(EventPayload::ResourceTerminated {
            resource_id: resource_id.to_string(),
            success,
        });
    }

    fn send_event(&self, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.on_event(&Event {
                time: Utc::now(),
                payload,
            });
        }
    }
}

/// Appends events to a file, one JSON object per line.
pub struct JournalSink {
    writer: RefCell<BufWriter<File>>,
}

impl JournalSink {
    pub fn create(path: &Path) -> crate::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: RefCell::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for JournalSink {
    fn on_event(&self, event: &Event) {
        let mut writer = self.writer.borrow_mut();
        if let Err(error) = write_event(&mut *writer, event) {
            log::warn!("Cannot write event into the event log: {error}");
        }
    }
}

fn write_event<W: Write>(writer: &mut W, event: &Event) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::provision::events::{Event, EventPayload, EventStreamer, JournalSink};

    #[test]
    fn streamer_without_sink_drops_events() {
        let streamer = EventStreamer::default();
        streamer.on_resource_terminated("i-1", true);
    }

    #[test]
    fn journal_writes_json_lines() {
        let dir = TempDir::with_prefix("provisioner").unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let sink = JournalSink::create(&path).unwrap();
            let streamer = EventStreamer::new(Some(Rc::new(sink)));
            streamer.on_backoff("web", 1, Duration::from_secs(30));
            streamer.on_resource_terminated("i-1", false);
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<Event> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].payload,
            EventPayload::BackoffWait {
                name: "web".to_string(),
                attempt: 1,
                delay: Duration::from_secs(30),
            }
        );
        assert!(content.lines().nth(1).unwrap().contains(r#""type":"resource-terminated""#));
    }
}
