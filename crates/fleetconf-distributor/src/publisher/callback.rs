// crates/fleetconf-distributor/src/publisher/callback.rs
// ============================================================================
// Module: Callback Publisher
// Description: Publisher that invokes a caller-supplied function.
// Purpose: Bridge to transports owned by the embedding process.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`CallbackPublisher`] forwards each message to a handler. The handler's
//! result is returned unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::message::BusMessage;
use crate::publisher::ConfigPublisher;
use crate::publisher::PublishError;

// ============================================================================
// SECTION: Callback Publisher
// ============================================================================

/// Handler signature used by the publisher.
type PublishHandler = dyn Fn(&BusMessage) -> Result<(), PublishError> + Send + Sync;

/// Callback-based publisher.
#[derive(Clone)]
pub struct CallbackPublisher {
    /// Handler invoked per message.
    handler: Arc<PublishHandler>,
}

impl CallbackPublisher {
    /// Creates a publisher from a handler function.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&BusMessage) -> Result<(), PublishError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl ConfigPublisher for CallbackPublisher {
    fn publish(&self, message: &BusMessage) -> Result<(), PublishError> {
        (self.handler)(message)
    }
}

impl fmt::Debug for CallbackPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPublisher").finish_non_exhaustive()
    }
}
