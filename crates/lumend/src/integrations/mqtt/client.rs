//! MQTT link client.
//!
//! Both protocol sides ride the same broker: the Controller's commands and
//! notifications, and the Backend's state events and service calls. The
//! trait exists so the bridge can be exercised against a mock.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::config::MqttConfig;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("MQTT client not connected")]
    NotConnected,

    #[error("MQTT request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// A message received from a subscribed topic.
#[derive(Debug, Clone)]
pub struct LinkMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait LinkClient: Send + Sync {
    async fn connect(&mut self) -> Result<(), LinkError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError>;

    /// Next message from any subscribed topic, `None` when the link is
    /// closed.
    async fn poll_message(&mut self) -> Option<LinkMessage>;
}

/// Production client backed by rumqttc.
pub struct RumqttcLink {
    options: MqttOptions,
    client: Option<AsyncClient>,
    message_rx: Option<mpsc::UnboundedReceiver<LinkMessage>>,
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcLink {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        Self {
            options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, LinkError> {
        self.client.as_ref().ok_or(LinkError::NotConnected)
    }
}

#[async_trait]
impl LinkClient for RumqttcLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        let (client, mut event_loop) = AsyncClient::new(self.options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = LinkMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.client()?.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<LinkMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for RumqttcLink {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

/// Mock client for bridge tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockLinkClient {
    pub queued: Vec<LinkMessage>,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
}

#[cfg(test)]
#[async_trait]
impl LinkClient for MockLinkClient {
    async fn connect(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<LinkMessage> {
        if self.queued.is_empty() {
            None
        } else {
            Some(self.queued.remove(0))
        }
    }
}
