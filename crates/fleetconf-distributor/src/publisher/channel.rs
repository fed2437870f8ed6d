// crates/fleetconf-distributor/src/publisher/channel.rs
// ============================================================================
// Module: Channel Publisher
// Description: Publisher backed by a Tokio mpsc channel.
// Purpose: Feed an async bus task without blocking the writer.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`ChannelPublisher`] enqueues each message with `try_send`. A full or
//! closed channel is reported as a delivery failure rather than waiting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::sync::mpsc::Sender;

use crate::message::BusMessage;
use crate::publisher::ConfigPublisher;
use crate::publisher::PublishError;

// ============================================================================
// SECTION: Channel Publisher
// ============================================================================

/// Channel-based publisher.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    /// Sender feeding the bus task.
    sender: Sender<BusMessage>,
}

impl ChannelPublisher {
    /// Creates a publisher around an existing sender.
    #[must_use]
    pub const fn new(sender: Sender<BusMessage>) -> Self {
        Self {
            sender,
        }
    }
}

impl ConfigPublisher for ChannelPublisher {
    fn publish(&self, message: &BusMessage) -> Result<(), PublishError> {
        self.sender
            .try_send(message.clone())
            .map_err(|err| PublishError::DeliveryFailed(err.to_string()))
    }
}
