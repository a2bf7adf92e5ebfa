//! Bridges the MQTT link to the engine's channels.
//!
//! Strictly a transport: JSON payloads are decoded once at this boundary
//! into validated engine inputs, and engine outputs are serialized back out.
//! A payload that fails to decode is logged and dropped, never fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::LinkClient;
use crate::config::MqttConfig;
use crate::engine::message::ConfigUpdate;
use crate::engine::message::ControllerCommand;
use crate::engine::message::StateEvent;
use crate::engine::EngineInput;
use crate::runtime::EngineRuntime;

/// Decode an inbound payload according to the topic it arrived on.
fn decode(config: &MqttConfig, topic: &str, payload: &[u8]) -> Option<EngineInput> {
    if topic == config.command_topic {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| warn!("undecodable command payload: {}", e))
            .ok()?;
        match ControllerCommand::from_wire(&value) {
            Some(cmd) => Some(EngineInput::Command(cmd)),
            None => {
                warn!("unknown controller command: {}", value);
                None
            }
        }
    } else if topic == config.state_topic {
        match serde_json::from_slice::<StateEvent>(payload) {
            Ok(event) => Some(EngineInput::Backend(event)),
            Err(e) => {
                warn!("undecodable state event: {}", e);
                None
            }
        }
    } else if topic == config.config_topic {
        match serde_json::from_slice::<ConfigUpdate>(payload) {
            Ok(update) => Some(EngineInput::Configure(update)),
            Err(e) => {
                warn!("undecodable config update: {}", e);
                None
            }
        }
    } else {
        debug!("ignoring message on {}", topic);
        None
    }
}

pub struct MqttBridge<C: LinkClient> {
    client: Arc<Mutex<C>>,
    config: MqttConfig,
}

impl<C: LinkClient + 'static> MqttBridge<C> {
    pub fn new(client: C, config: MqttConfig) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            config,
        }
    }

    #[cfg(test)]
    fn client_handle(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.client)
    }

    /// Connect, subscribe both inbound topics, and spawn the two forwarding
    /// tasks. The returned handles live as long as the process.
    pub async fn start(
        self,
        runtime: &mut EngineRuntime,
    ) -> Result<Vec<JoinHandle<()>>, super::client::LinkError> {
        {
            let mut client = self.client.lock().await;
            client.connect().await?;
            client.subscribe(&self.config.command_topic).await?;
            client.subscribe(&self.config.config_topic).await?;
            client.subscribe(&self.config.state_topic).await?;
        }
        info!(
            "MQTT bridge up: commands on {}, state on {}",
            self.config.command_topic, self.config.state_topic
        );

        let input_tx = runtime.input_tx.clone();
        let mut notifications = std::mem::replace(&mut runtime.notifications, closed_receiver());
        let mut service_calls = std::mem::replace(&mut runtime.service_calls, closed_receiver());

        let inbound = {
            let client = self.client.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                loop {
                    // Short lock hold so the outbound task can publish; a
                    // timed-out poll just loops. A real None means the link
                    // is closed and the task must not spin on it.
                    let polled = {
                        let mut client = client.lock().await;
                        tokio::time::timeout(
                            Duration::from_millis(100),
                            client.poll_message(),
                        )
                        .await
                    };
                    let msg = match polled {
                        Ok(Some(msg)) => msg,
                        Ok(None) => {
                            info!("MQTT link closed, inbound task exiting");
                            break;
                        }
                        Err(_) => {
                            tokio::task::yield_now().await;
                            continue;
                        }
                    };
                    if let Some(input) = decode(&config, &msg.topic, &msg.payload) {
                        if input_tx.send(input).is_err() {
                            break;
                        }
                    }
                }
            })
        };

        let outbound = {
            let client = self.client.clone();
            let config = self.config;
            tokio::spawn(async move {
                loop {
                    let (topic, payload) = tokio::select! {
                        Some(n) = notifications.recv() => {
                            (config.notify_topic.clone(), serde_json::to_vec(&n))
                        }
                        Some(c) = service_calls.recv() => {
                            (config.call_topic.clone(), serde_json::to_vec(&c))
                        }
                        else => break,
                    };
                    let payload = match payload {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("failed to serialize outbound payload: {}", e);
                            continue;
                        }
                    };
                    let mut client = client.lock().await;
                    if let Err(e) = client.publish(&topic, &payload).await {
                        warn!("publish to {} failed: {}", topic, e);
                    }
                }
            })
        };

        Ok(vec![inbound, outbound])
    }
}

/// A receiver whose sender is already gone, for swapping out of the runtime.
fn closed_receiver<T>() -> mpsc::UnboundedReceiver<T> {
    let (_, rx) = mpsc::unbounded_channel();
    rx
}
