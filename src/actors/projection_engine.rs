pub mod engine;
pub mod handlers;
pub mod messages;

pub use engine::ProjectionEngine;
pub use messages::EngineMessage;
