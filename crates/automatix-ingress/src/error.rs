// automatix-ingress/src/error.rs
// ============================================================================
// Module: Ingress Errors
// Description: The error boundary Trigger Ingress owns.
// Purpose: Map webhook/poll intake failures into the shared error taxonomy.
// Dependencies: automatix_core, thiserror
// ============================================================================

use automatix_core::ErrorKind;

/// Errors raised while registering or dispatching a trigger.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// No webhook trigger is registered under the given id.
    #[error("unknown webhook trigger")]
    UnknownWebhook,
    /// No polling trigger is registered under the given id.
    #[error("unknown polling trigger")]
    UnknownPoll,
    /// Signature verification rejected the delivery.
    #[error("signature verification failed: {0}")]
    SignatureRejected(String),
    /// The connector invocation backing a poll failed.
    #[error("poll invocation failed: {0}")]
    PollInvocationFailed(String),
}

impl IngressError {
    /// Classifies this error into the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownWebhook | Self::UnknownPoll => ErrorKind::Validation,
            Self::SignatureRejected(_) => ErrorKind::Signature,
            Self::PollInvocationFailed(_) => ErrorKind::TransientTransport,
        }
    }
}
