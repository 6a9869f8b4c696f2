//! `beacon_core` is a common library to build Beacon SDKs for different languages. If you're a
//! Beacon user, you probably want to take a look at one of existing SDKs.
//!
//! # Overview
//!
//! `beacon_core` is organized as a set of building blocks that help to build Beacon SDKs. The
//! central piece is the staged event-processing [`processor`]: it accepts impression and
//! conversion events from any number of application threads and delivers them to the ingestion
//! endpoint, coalescing events into batches to amortize network cost. Around it sit the wire-level
//! event records ([`EventRecord`], [`LogRequest`]), the delivery plumbing
//! ([`event_factory`], [`event_delivery`]) and the collaborator seams
//! ([`event_handler`], [`executor`]).
//!
//! # Versioning
//!
//! This library follows semver. However, it is considered an internal library, so expect frequent
//! breaking changes and major version bumps.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod event_delivery;
pub mod event_factory;
pub mod event_handler;
pub mod executor;
pub mod processor;

mod error;
mod events;

pub use error::{Error, Result};
pub use events::{EventRecord, LogRequest, RequestMethod, Visitor, VisitorEvent};
