//! Single-assignment, multi-reader hand-off of one task's output.
//!
//! [`ResultCell::new`] returns the two halves. The publisher is consumed by
//! [`ResultPublisher::publish`], so a cell can be written at most once. Every
//! subscriber clone observes the same value. If the publisher is dropped
//! without publishing, waiting subscribers wake up with
//! [`TaskOutput::Null`] instead of hanging.

use tokio::sync::watch;
use tracing::warn;
use crate::TaskOutput;

pub struct ResultCell;

impl ResultCell {
    pub fn new(id: impl Into<String>) -> (ResultPublisher, ResultSubscriber) {
        let id = id.into();
        let (tx, rx) = watch::channel(None);
        (
            ResultPublisher { id: id.clone(), tx },
            ResultSubscriber { id, rx },
        )
    }
}

#[derive(Debug)]
pub struct ResultPublisher {
    id: String,
    tx: watch::Sender<Option<TaskOutput>>,
}

impl ResultPublisher {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn publish(self, output: TaskOutput) {
        // stored even when nobody is subscribed yet
        self.tx.send_replace(Some(output));
    }
}

#[derive(Debug, Clone)]
pub struct ResultSubscriber {
    id: String,
    rx: watch::Receiver<Option<TaskOutput>>,
}

impl ResultSubscriber {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn wait(&mut self) -> TaskOutput {
        match self.rx.wait_for(Option::is_some).await {
            Ok(output) => (*output).clone().unwrap_or(TaskOutput::Null),
            Err(_) => {
                warn!(task = %self.id, "result cell closed without a published value");
                TaskOutput::Null
            }
        }
    }

    pub fn try_get(&self) -> Option<TaskOutput> {
        self.rx.borrow().clone()
    }
}
