use crate::traits::DisplaySink;
use crate::types::{Article, Batch};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What a `ChannelSink` forwards
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Batch(Batch),
    Flash(Vec<Article>),
}

/// Forwards batches and flashes to a channel, for embedding the pipeline in another task
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DisplaySink for ChannelSink {
    fn publish(&mut self, batch: &Batch) {
        if self.sender.send(SinkEvent::Batch(batch.clone())).is_err() {
            debug!("Batch {} dropped, receiver gone", batch.cycle);
        }
    }

    fn flash(&mut self, delta: &[Article]) {
        if self.sender.send(SinkEvent::Flash(delta.to_vec())).is_err() {
            debug!("Flash of {} articles dropped, receiver gone", delta.len());
        }
    }
}

/// Default sink: reports batches through tracing
#[derive(Debug, Default)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn publish(&mut self, batch: &Batch) {
        info!("Published batch {} with {} articles", batch.cycle, batch.len());
    }

    fn flash(&mut self, delta: &[Article]) {
        for article in delta {
            info!("New: [{}] {}", article.source_name, article.title);
        }
    }
}
