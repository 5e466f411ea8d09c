/*
[INPUT]:  PIN entries and navigation actions from the setup screens
[OUTPUT]: Validated setup progress ending in a confirmed PIN
[POS]:    Security layer - PIN creation/confirmation state machine
[UPDATE]: When setup steps or transition rules change
*/

use std::fmt;

use thiserror::Error;

use crate::security::hash::PinInput;

/// Visible step of the setup flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Intro,
    Create,
    Confirm,
    Confirmed,
    Cancelled,
}

/// Actions that drive setup transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAction {
    Begin,
    Enter,
    Back,
    Cancel,
}

/// Errors occurring during setup transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("Invalid transition: {from:?} -> {action:?}")]
    InvalidTransition { from: SetupStage, action: SetupAction },

    #[error("PIN must be 4 or 6 digits")]
    InvalidPin,
}

/// What a PIN entry did to the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupProgress {
    /// First entry accepted; waiting for the confirmation entry.
    AwaitingConfirmation,
    /// Confirmation differed; back to `Create`. Nothing was stored.
    Mismatch,
    /// Both entries matched.
    Confirmed,
}

enum Step {
    Intro,
    Create,
    Confirm { first: PinInput },
    Confirmed { pin: PinInput },
    Cancelled,
}

/// PIN creation flow: `Intro -> Create -> Confirm -> Confirmed`.
///
/// Holds entered PINs in memory only; persisting happens in
/// `PinSecurityController::complete_setup`.
pub struct PinSetupFlow {
    step: Step,
}

impl fmt::Debug for PinSetupFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinSetupFlow")
            .field("stage", &self.stage())
            .finish()
    }
}

impl Default for PinSetupFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl PinSetupFlow {
    pub fn new() -> Self {
        Self { step: Step::Intro }
    }

    pub fn stage(&self) -> SetupStage {
        match self.step {
            Step::Intro => SetupStage::Intro,
            Step::Create => SetupStage::Create,
            Step::Confirm { .. } => SetupStage::Confirm,
            Step::Confirmed { .. } => SetupStage::Confirmed,
            Step::Cancelled => SetupStage::Cancelled,
        }
    }

    /// Check if the action is valid from the current stage
    pub fn can_transition(&self, action: SetupAction) -> bool {
        matches!(
            (self.stage(), action),
            (SetupStage::Intro, SetupAction::Begin)
                | (SetupStage::Create | SetupStage::Confirm, SetupAction::Enter)
                | (SetupStage::Create | SetupStage::Confirm, SetupAction::Back)
                | (
                    SetupStage::Intro | SetupStage::Create | SetupStage::Confirm,
                    SetupAction::Cancel
                )
        )
    }

    fn guard(&self, action: SetupAction) -> Result<(), SetupError> {
        if self.can_transition(action) {
            Ok(())
        } else {
            Err(SetupError::InvalidTransition {
                from: self.stage(),
                action,
            })
        }
    }

    pub fn begin(&mut self) -> Result<(), SetupError> {
        self.guard(SetupAction::Begin)?;
        self.step = Step::Create;
        Ok(())
    }

    /// Submit a PIN for the current stage.
    ///
    /// A malformed PIN leaves the stage unchanged.
    pub fn enter(&mut self, pin: PinInput) -> Result<SetupProgress, SetupError> {
        self.guard(SetupAction::Enter)?;
        pin.validate().map_err(|_| SetupError::InvalidPin)?;

        let (next, progress) = match std::mem::replace(&mut self.step, Step::Cancelled) {
            Step::Create => (Step::Confirm { first: pin }, SetupProgress::AwaitingConfirmation),
            Step::Confirm { first } if first.as_str() == pin.as_str() => {
                (Step::Confirmed { pin }, SetupProgress::Confirmed)
            }
            Step::Confirm { .. } => (Step::Create, SetupProgress::Mismatch),
            // guarded above
            other => (other, SetupProgress::Mismatch),
        };
        self.step = next;
        Ok(progress)
    }

    /// Step back one screen; the first entry is discarded when leaving `Confirm`.
    pub fn back(&mut self) -> Result<(), SetupError> {
        self.guard(SetupAction::Back)?;
        self.step = match self.step {
            Step::Confirm { .. } => Step::Create,
            _ => Step::Intro,
        };
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), SetupError> {
        self.guard(SetupAction::Cancel)?;
        self.step = Step::Cancelled;
        Ok(())
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.step, Step::Confirmed { .. })
    }

    /// The confirmed PIN, consuming the flow.
    pub fn into_confirmed(self) -> Result<PinInput, SetupError> {
        match self.step {
            Step::Confirmed { pin } => Ok(pin),
            _ => Err(SetupError::InvalidTransition {
                from: self.stage(),
                action: SetupAction::Enter,
            }),
        }
    }
}
