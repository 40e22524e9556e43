use std::sync::Arc;

use plotpot_types::Backend;
use plotpot_types::api::Identity;

use crate::error::ClientError;

/// Resolves the acting identity before a write that records authorship.
pub struct SessionGate<B> {
    backend: Arc<B>,
}

impl<B> Clone for SessionGate<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> SessionGate<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn current(&self) -> Option<Identity> {
        self.backend.current_identity()
    }

    /// The signed-in identity, or [`ClientError::NotSignedIn`].
    pub fn require(&self) -> Result<Identity, ClientError> {
        self.current().ok_or(ClientError::NotSignedIn)
    }
}
