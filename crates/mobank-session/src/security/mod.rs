/*
[INPUT]:  PIN entries, biometric results, secure store
[OUTPUT]: Lock state, PIN verification outcomes and security errors
[POS]:    Security layer - local PIN/biometric app lock
[UPDATE]: When lock rules, PIN policy or biometric integration change
*/

pub mod biometric;
pub mod hash;
pub mod pin;
pub mod setup;

use thiserror::Error;

use crate::store::StoreError;

pub use biometric::{BiometricAuthenticator, BiometricCapability, MockBiometricAuthenticator};
pub use hash::{PinHasher, PinInput};
pub use pin::{PinSecurityController, PinVerification};
pub use setup::{PinSetupFlow, SetupAction, SetupError, SetupProgress, SetupStage};

/// Failures of PIN operations.
///
/// A wrong PIN is not an error; see `PinVerification`.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("No PIN is configured")]
    NotConfigured,

    #[error("A PIN is already configured; change it with the current PIN")]
    AlreadyConfigured,

    #[error("PIN must be 4 or 6 digits, got {0}")]
    InvalidPinLength(usize),

    #[error("PIN must contain only digits")]
    InvalidPinFormat,

    #[error("PIN hashing failed: {0}")]
    Hashing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}
