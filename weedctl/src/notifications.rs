//! Push-channel listener.
//!
//! The detection service broadcasts progress messages ("Slicing complete. Starting weed
//! detection.", ...) over a WebSocket. Each text frame becomes a paragraph in the message region,
//! in arrival order. A closed or failed connection ends the subscription without reconnecting.

use crate::errors::Result;
use crate::page::{Effect, EffectSink, Region};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Why the subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// Server closed the channel
    Closed,
    /// Connection failed mid-stream
    Dropped,
    Shutdown,
}

/// Effect for one inbound frame; non-text frames produce none.
pub fn notification_effect(message: Message) -> Option<Effect> {
    match message {
        Message::Text(text) => Some(Effect::AppendParagraph {
            region: Region::Message,
            text: text.to_string(),
        }),
        other => {
            tracing::debug!(frame = ?other, "Ignoring non-text frame");
            None
        }
    }
}

pub struct NotificationListener {
    url: Url,
}

impl NotificationListener {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Connect and forward messages to `sink` until the channel ends or `shutdown` fires.
    ///
    /// Only the initial handshake can fail; errors after that end the subscription quietly.
    #[tracing::instrument(skip(self, sink, shutdown), fields(url = %self.url))]
    pub async fn run(&self, sink: &dyn EffectSink, shutdown: CancellationToken) -> Result<ListenerExit> {
        let (mut stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        tracing::info!("Push channel connected");

        let exit = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break ListenerExit::Shutdown,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(_))) | None => break ListenerExit::Closed,
                    Some(Ok(message)) => {
                        if let Some(effect) = notification_effect(message) {
                            tracing::debug!("Push message received");
                            sink.apply(effect);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Push channel failed");
                        break ListenerExit::Dropped;
                    }
                },
            }
        };

        tracing::info!(exit = ?exit, "Push channel subscription ended");
        Ok(exit)
    }
}
