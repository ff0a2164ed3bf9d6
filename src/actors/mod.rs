pub mod channel_client;
pub mod projection_engine;
