pub mod color;
mod dispatcher;
#[allow(clippy::module_inception)]
mod engine;
mod ingest;
pub mod message;
pub mod ramp;
pub mod scene;
pub mod scheduler;
pub mod session;
#[cfg(test)]
pub(crate) mod testutil;

pub use engine::EngineInput;
pub use engine::LightEngine;
