//! The Rust SDK for Beacon, a next-generation feature flagging and experimentation platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that tracks impression and conversion events for
//! "visitors", where each visitor has a unique key and key-value attributes associated with it.
//! Tracked events are buffered in-process, coalesced into batches and delivered to the Beacon
//! ingestion endpoint in the background, so [`Client::track`] is cheap enough to call from hot
//! application paths.
//!
//! # Delivery callbacks
//!
//! Delivery happens asynchronously; register a callback with
//! [`ClientConfig::delivery_callback`] to observe which events reached the ingestion endpoint and
//! which failed:
//!
//! ```
//! # use beacon::{ClientConfig, Error, EventRecord, FnCallback};
//! let config = ClientConfig::from_sdk_key("sdk-key").delivery_callback(FnCallback::new(
//!     |record: &EventRecord| println!("delivered {} visitor(s)", record.visitors.len()),
//!     |_: &EventRecord, err: &Error| eprintln!("delivery failed: {err}"),
//! ));
//! ```
//!
//! # Shutdown
//!
//! Events may sit in the buffer for up to the configured batching deadline. Call
//! [`Client::shutdown`] before the process exits to flush and drain them; it returns `false` if
//! the drain did not complete within the given timeout.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Tracking itself never fails: event delivery
//! should not be critical enough to crash the host application, so failures are routed to
//! delivery callbacks and the log instead of the call site.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better visibility
//! into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the [examples directory](https://github.com/beacon-exp/rust-sdk/examples)
//! of the `beacon` crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;
mod event;

#[doc(inline)]
pub use beacon_core::{
    processor::{BatchingConfig, Callback, FnCallback},
    Error, EventRecord, LogRequest, Result, Visitor, VisitorEvent,
};

pub use client::Client;
pub use config::ClientConfig;
pub use event::TrackEvent;
