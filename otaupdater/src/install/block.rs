//! Seam to the block-based ("A/B") update engine.
//!
//! The engine is an external service. It is driven through [`BlockEngine`]
//! and reports back through the [`EngineCallback`] handed over in
//! [`BlockEngine::bind`]. Callbacks are turned into messages for the
//! registry daemon, so they may fire from any thread.

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::error::EngineError;
use crate::registry::RegistryMessage;

/// Status reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    CheckingForUpdate,
    UpdateAvailable,
    Downloading,
    Verifying,
    Finalizing,
    UpdatedNeedReboot,
    ReportingErrorEvent,
    AttemptingRollback,
    Disabled,
}

/// Result code of a payload application. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineErrorCode(pub i32);

impl EngineErrorCode {
    pub const SUCCESS: Self = Self(0);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine error {}", self.0)
    }
}

/// A callback from the engine, as delivered to the registry daemon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// `percent` is the engine's fraction in `0.0..=1.0`.
    Status { state: EngineState, percent: f32 },
    PayloadComplete(EngineErrorCode),
}

/// Where the engine sends its status updates.
#[derive(Debug, Clone)]
pub struct EngineCallback {
    messages: UnboundedSender<RegistryMessage>,
}

impl EngineCallback {
    pub(crate) fn new(messages: UnboundedSender<RegistryMessage>) -> Self {
        Self { messages }
    }

    pub fn on_status_update(&self, state: EngineState, percent: f32) {
        trace!(?state, percent, "Engine status");
        self.post(EngineEvent::Status { state, percent });
    }

    pub fn on_payload_application_complete(&self, code: EngineErrorCode) {
        self.post(EngineEvent::PayloadComplete(code));
    }

    fn post(&self, event: EngineEvent) {
        // The daemon is gone during shutdown; nothing left to update.
        let _ = self.messages.send(RegistryMessage::Engine(event));
    }
}

/// Privileged block-based update engine.
pub trait BlockEngine: Send + Sync {
    /// Register for callbacks. Returns false if the engine is unreachable.
    fn bind(&self, callback: EngineCallback) -> bool;

    /// Start applying the payload found at `offset` inside the package at
    /// `uri`.
    fn apply_payload(&self, uri: &str, offset: u64, properties: &[String]) -> Result<(), EngineError>;

    fn suspend(&self) -> Result<(), EngineError>;

    fn resume(&self) -> Result<(), EngineError>;

    fn cancel(&self) -> Result<(), EngineError>;

    fn set_performance_mode(&self, enabled: bool) -> Result<(), EngineError>;
}

/// Engine for hosts without block-based updates. Binding always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBlockEngine;

impl BlockEngine for UnsupportedBlockEngine {
    fn bind(&self, _callback: EngineCallback) -> bool {
        false
    }

    fn apply_payload(&self, _uri: &str, _offset: u64, _properties: &[String]) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("block update engine"))
    }

    fn suspend(&self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("block update engine"))
    }

    fn resume(&self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("block update engine"))
    }

    fn cancel(&self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("block update engine"))
    }

    fn set_performance_mode(&self, _enabled: bool) -> Result<(), EngineError> {
        Err(EngineError::Unavailable("block update engine"))
    }
}
