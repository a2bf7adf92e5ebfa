pub mod config;
pub mod engine;
pub mod integrations;
pub mod persist;
pub mod runtime;

pub use config::Config;
pub use engine::EngineInput;
pub use engine::LightEngine;
pub use runtime::EngineRuntime;
