//! OneBot v11 adapter.
//!
//! - `event`: converts posted message events into `MessageEvent`
//! - `client`: `ActionInvoker` over the OneBot HTTP API

pub mod client;
pub mod event;

pub use client::OneBotHttpClient;
pub use event::{OneBotPost, parse_post};
