mod bridge;
mod client;

pub use bridge::MqttBridge;
pub use client::LinkClient;
pub use client::LinkError;
pub use client::LinkMessage;
pub use client::RumqttcLink;
