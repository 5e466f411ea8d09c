/*
[INPUT]:  Platform biometric prompt results
[OUTPUT]: Biometric capability and authentication outcome
[POS]:    Security layer - biometric platform abstraction
[UPDATE]: When supporting new biometric kinds or prompt options
*/

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// What the device can offer for biometric unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricCapability {
    Unavailable,
    /// Hardware present but nothing enrolled.
    NotEnrolled,
    Fingerprint,
    Face,
    Iris,
}

impl BiometricCapability {
    pub fn is_available(self) -> bool {
        matches!(
            self,
            BiometricCapability::Fingerprint | BiometricCapability::Face | BiometricCapability::Iris
        )
    }
}

/// Trait for the platform biometric prompt
///
/// The controller never prompts on its own; it only asks this collaborator
/// and records the result.
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    fn capability(&self) -> BiometricCapability;

    /// Show the prompt and report whether the user passed it
    async fn authenticate(&self, prompt: &str) -> bool;
}

/// Mock biometric authenticator for testing
#[derive(Debug, Clone)]
pub struct MockBiometricAuthenticator {
    capability: BiometricCapability,
    succeed: bool,
    prompts: Arc<AtomicU32>,
}

impl MockBiometricAuthenticator {
    /// Create a mock with a fixed capability and outcome
    pub fn new(capability: BiometricCapability, succeed: bool) -> Self {
        Self {
            capability,
            succeed,
            prompts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// How many times a prompt was shown
    pub fn prompts(&self) -> u32 {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricAuthenticator for MockBiometricAuthenticator {
    fn capability(&self) -> BiometricCapability {
        self.capability
    }

    async fn authenticate(&self, _prompt: &str) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}
