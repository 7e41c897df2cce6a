//! Channel manager — lifecycle and outbound routing.
//!
//! Channels register here; `start_all` launches each channel's listener
//! plus one dispatcher task that drains the bus's outbound queue and
//! routes every message to the channel named in it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use tinyclaw_core::bus::MessageBus;

use crate::base::Channel;

/// How long the dispatcher waits per poll before rechecking shutdown.
const DISPATCH_POLL: Duration = Duration::from_millis(500);

/// Manages the lifecycle and message routing for all channels.
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
    bus: Arc<MessageBus>,
    shutdown: Arc<Notify>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: HashMap::new(),
            bus,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Register a channel. Overwrites any previous channel with the same
    /// name.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel");
        self.channels.insert(name, channel);
    }

    /// Get a registered channel by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Names of all registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start all channels plus the outbound dispatcher; blocks until
    /// `stop_all` is called.
    pub async fn start_all(&self) -> Result<()> {
        if self.channels.is_empty() {
            warn!("no channels registered, nothing to start");
            return Ok(());
        }

        info!(channels = ?self.channel_names(), "starting channels");

        let mut handles = Vec::new();
        for (name, channel) in &self.channels {
            let ch = channel.clone();
            let ch_name = name.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = ch.start().await {
                    error!(channel = %ch_name, error = %e, "channel start failed");
                }
            }));
        }

        // Outbound dispatcher.
        let channels = self.channels.clone();
        let bus = self.bus.clone();
        let shutdown = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    msg = bus.consume_outbound_timeout(DISPATCH_POLL) => {
                        let Some(msg) = msg else { continue };
                        match channels.get(&msg.channel) {
                            Some(channel) => {
                                debug!(channel = %msg.channel, chat_id = %msg.chat_id, "dispatching outbound");
                                if let Err(e) = channel.send(&msg).await {
                                    error!(channel = %msg.channel, error = %e, "send failed");
                                }
                            }
                            None => {
                                warn!(channel = %msg.channel, "no channel for outbound message");
                            }
                        }
                    }
                }
            }
        }));

        self.shutdown.notified().await;

        for handle in handles {
            handle.abort();
        }
        self.do_stop_channels().await;
        Ok(())
    }

    /// Stop all channels and the dispatcher.
    pub fn stop_all(&self) {
        info!("stopping channels");
        self.shutdown.notify_waiters();
    }

    async fn do_stop_channels(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "channel stop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tinyclaw_core::bus::OutboundMessage;

    struct RecordingChannel {
        name: String,
        sent: Arc<tokio::sync::Mutex<Vec<OutboundMessage>>>,
    }

    impl RecordingChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                sent: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn send(&self, msg: &OutboundMessage) -> Result<()> {
            self.sent.lock().await.push(msg.clone());
            Ok(())
        }
    }

    #[test]
    fn test_register_and_names() {
        let bus = Arc::new(MessageBus::new(8));
        let mut mgr = ChannelManager::new(bus);
        assert!(mgr.is_empty());

        mgr.register(Arc::new(RecordingChannel::new("web")));
        mgr.register(Arc::new(RecordingChannel::new("cli")));
        assert_eq!(mgr.channel_names(), vec!["cli", "web"]);
        assert!(mgr.get("cli").is_some());
        assert!(mgr.get("nope").is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_routes_to_named_channel() {
        let bus = Arc::new(MessageBus::new(8));
        let mut mgr = ChannelManager::new(bus.clone());

        let cli = Arc::new(RecordingChannel::new("cli"));
        let web = Arc::new(RecordingChannel::new("web"));
        mgr.register(cli.clone());
        mgr.register(web.clone());

        let mgr = Arc::new(mgr);
        let runner = mgr.clone();
        let handle = tokio::spawn(async move { runner.start_all().await });

        bus.publish_outbound(OutboundMessage::new("web", "sid", "for web"))
            .unwrap();
        bus.publish_outbound(OutboundMessage::new("cli", "default", "for cli"))
            .unwrap();

        // Let the dispatcher drain.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if web.sent.lock().await.len() == 1 && cli.sent.lock().await.len() == 1 {
                break;
            }
        }

        assert_eq!(web.sent.lock().await[0].content, "for web");
        assert_eq!(cli.sent.lock().await[0].content, "for cli");

        mgr.stop_all();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_start_all_empty_returns() {
        let bus = Arc::new(MessageBus::new(8));
        let mgr = ChannelManager::new(bus);
        mgr.start_all().await.unwrap();
    }
}
