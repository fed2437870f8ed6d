// crates/fleetconf-distributor/src/publisher/mod.rs
// ============================================================================
// Module: Config Publishers
// Description: Message-bus seam and reference publisher implementations.
// Purpose: Hand signed config messages to a transport.
// Dependencies: thiserror, std
// ============================================================================

//! ## Overview
//! [`ConfigPublisher`] is the boundary to the message bus. The MQTT client
//! adapter lives outside this workspace; the implementations here cover
//! in-process delivery, callbacks, and JSON-line logging.
//! Invariants:
//! - `publish` returns `Ok` only after the transport accepted the message.
//! - Failures leave no partial side effects in the publisher.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::message::BusMessage;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors emitted by publishers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The transport refused or dropped the message.
    #[error("publish failed: {0}")]
    DeliveryFailed(String),
    /// The log publisher could not write its record.
    #[error("log write failed: {0}")]
    LogWriteFailed(String),
}

// ============================================================================
// SECTION: Publisher Trait
// ============================================================================

/// Delivers bus messages to a transport.
pub trait ConfigPublisher: Send + Sync {
    /// Publishes one message.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the transport rejects the message.
    fn publish(&self, message: &BusMessage) -> Result<(), PublishError>;
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

pub mod callback;
pub mod channel;
pub mod log;

pub use callback::CallbackPublisher;
pub use channel::ChannelPublisher;
pub use log::LogPublisher;
