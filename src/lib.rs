//! Async client for TradingView's chart streaming protocol.
//!
//! Fetches OHLCV candles with optional indicator studies and streams live
//! quotes over the vendor's framed WebSocket protocol. Results are returned in
//! a uniform [`Response`](models::response::Response) envelope and can be
//! exported to JSON or CSV.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod rest;
pub mod streamer;
pub mod validate;
pub mod websocket;

pub use error::{Result, TvFeedError};
pub use streamer::{CandleRequest, PriceStream, Streamer};
