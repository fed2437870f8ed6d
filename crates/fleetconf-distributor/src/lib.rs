// crates/fleetconf-distributor/src/lib.rs
// ============================================================================
// Module: fleetconf Distributor Library
// Description: Authenticated config-change distribution for worker fleets.
// Purpose: Publish signed updates and verify them on the consumer side.
// Dependencies: ed25519-dalek, fleetconf-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The distributor signs each committed config with Ed25519 and publishes it
//! to `config/updated/<service>` at QoS 1 without the retain flag. Workers use
//! [`ConfigVerifier`] and [`classify_update`] to decide what to apply.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod distributor;
pub mod message;
pub mod publisher;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use distributor::ConfigDistributor;
pub use distributor::DistributionError;
pub use distributor::DistributionOutcome;
pub use distributor::DistributorConfig;
pub use message::BusMessage;
pub use message::DEFAULT_TOPIC_PREFIX;
pub use message::DistributionMessage;
pub use message::QoS;
pub use message::topic_for;
pub use publisher::CallbackPublisher;
pub use publisher::ChannelPublisher;
pub use publisher::ConfigPublisher;
pub use publisher::LogPublisher;
pub use publisher::PublishError;
pub use verifier::ConfigVerifier;
pub use verifier::LocalConfigState;
pub use verifier::SignatureStatus;
pub use verifier::UpdateDecision;
pub use verifier::VerificationError;
pub use verifier::classify_update;
