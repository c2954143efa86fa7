use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;

use crate::client::output::outputs::Output;
use crate::provision::api::ResourceApi;
use crate::provision::api::aws::{AwsCliClient, AwsCliConfig};
use crate::provision::events::{EventSink, EventStreamer, JournalSink};

pub struct GlobalSettings {
    api_config: AwsCliConfig,
    workers: usize,
    report_path: PathBuf,
    event_log: Option<PathBuf>,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(
        api_config: AwsCliConfig,
        workers: usize,
        report_path: PathBuf,
        event_log: Option<PathBuf>,
        printer: Box<dyn Output>,
    ) -> Self {
        GlobalSettings {
            api_config,
            workers,
            report_path,
            event_log,
            printer,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }

    /// Creates a client of the resource API in the configured region.
    pub fn resource_api(&self) -> Rc<dyn ResourceApi> {
        Rc::new(AwsCliClient::new(self.api_config.clone()))
    }

    /// Creates an event streamer that writes into the event log, if one was requested.
    pub fn event_streamer(&self) -> anyhow::Result<EventStreamer> {
        let sink = match &self.event_log {
            Some(path) => {
                let journal = JournalSink::create(path)
                    .with_context(|| format!("Cannot open event log {}", path.display()))?;
                Some(Rc::new(journal) as Rc<dyn EventSink>)
            }
            None => None,
        };
        Ok(EventStreamer::new(sink))
    }
}
