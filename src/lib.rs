//! image-guard: vision-model image moderation for chat groups.

pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod onebot;
pub mod pipeline;
pub mod server;
