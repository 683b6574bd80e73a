// src/lib.rs

//! xmonitor: X/Twitter account monitor with DingTalk alerts

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
