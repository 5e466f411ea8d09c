/*
[INPUT]:  PIN entries typed at the terminal
[OUTPUT]: PIN setup, verification, change and removal; biometric/timeout settings
[POS]:    CLI app-lock subcommands
[UPDATE]: When PIN management commands change
*/

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Subcommand, ValueEnum};
use console::style;
use dialoguer::{Confirm, Password, theme::ColorfulTheme};
use mobank_session::security::{PinInput, SetupProgress, SetupStage};
use mobank_session::{PinSetupFlow, PinVerification};

use super::App;

#[derive(Subcommand, Debug)]
pub enum PinCommand {
    /// Create (or replace) the app PIN
    Setup {
        #[arg(long)]
        biometric: bool,
    },
    /// Check a PIN and unlock
    Verify,
    /// Replace the PIN after confirming the current one
    Change,
    /// Forget the PIN
    Remove,
    /// Turn biometric unlock on or off
    Biometric {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Set the auto-lock timeout
    Timeout {
        #[arg(value_name = "SECONDS")]
        secs: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Toggle {
    On,
    Off,
}

pub async fn run(app: &App, command: PinCommand) -> Result<()> {
    match command {
        PinCommand::Setup { biometric } => setup(app, biometric).await,
        PinCommand::Verify => verify(app).await,
        PinCommand::Change => change(app).await,
        PinCommand::Remove => remove(app).await,
        PinCommand::Biometric { state } => {
            match state {
                Toggle::On => app.controller.enable_biometric().await?,
                Toggle::Off => app.controller.disable_biometric().await?,
            }
            println!("{} biometric unlock {}", style("✓").green(), match state {
                Toggle::On => "enabled",
                Toggle::Off => "disabled",
            });
            Ok(())
        }
        PinCommand::Timeout { secs } => {
            if secs == 0 {
                bail!("timeout must be at least one second");
            }
            app.controller
                .set_inactivity_timeout(Duration::from_secs(secs))
                .await
                .context("save inactivity timeout")?;
            println!("{} auto-lock after {secs}s of inactivity", style("✓").green());
            Ok(())
        }
    }
}

fn prompt_pin(prompt: &str) -> Result<PinInput> {
    let raw = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?;
    Ok(PinInput::new(raw))
}

async fn setup(app: &App, biometric: bool) -> Result<()> {
    let current = if app.controller.is_pin_set() {
        let replace = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("A PIN is already set. Replace it?")
            .default(false)
            .interact()?;
        if !replace {
            return Ok(());
        }
        Some(prompt_pin("Current PIN")?)
    } else {
        None
    };

    let mut flow = PinSetupFlow::new();
    flow.begin()?;
    loop {
        let prompt = if flow.stage() == SetupStage::Confirm {
            "Repeat PIN"
        } else {
            "New PIN (4 or 6 digits)"
        };
        let pin = prompt_pin(prompt)?;
        match flow.enter(pin) {
            Ok(SetupProgress::AwaitingConfirmation) => {}
            Ok(SetupProgress::Mismatch) => {
                println!("{}", style("PINs did not match, start again.").yellow());
            }
            Ok(SetupProgress::Confirmed) => break,
            Err(err) => println!("{}", style(err).yellow()),
        }
    }

    let Some(current) = current else {
        app.controller
            .complete_setup(flow, biometric)
            .await
            .context("save PIN")?;
        println!("{} PIN saved", style("✓").green());
        return Ok(());
    };

    // replacing goes through the current PIN and its attempt counter
    let new_pin = flow.into_confirmed()?;
    let outcome = app
        .controller
        .change_pin(current.as_str(), new_pin.as_str())
        .await?;
    if !outcome.is_valid() {
        report(&outcome);
        bail!("current PIN not accepted");
    }
    if biometric {
        app.controller.enable_biometric().await?;
    }
    println!("{} PIN replaced", style("✓").green());
    Ok(())
}

async fn verify(app: &App) -> Result<()> {
    let pin = prompt_pin("PIN")?;
    let outcome = app.controller.verify_pin(pin.as_str()).await?;
    report(&outcome);
    if !outcome.is_valid() {
        bail!("PIN not accepted");
    }
    Ok(())
}

async fn verify_current(app: &App) -> Result<()> {
    let pin = prompt_pin("Current PIN")?;
    let outcome = app.controller.verify_pin(pin.as_str()).await?;
    if !outcome.is_valid() {
        report(&outcome);
        bail!("current PIN not accepted");
    }
    Ok(())
}

async fn change(app: &App) -> Result<()> {
    let current = prompt_pin("Current PIN")?;
    let new_pin = prompt_pin("New PIN (4 or 6 digits)")?;
    let confirm = prompt_pin("Repeat new PIN")?;
    if new_pin.as_str() != confirm.as_str() {
        bail!("new PINs did not match");
    }

    let outcome = app
        .controller
        .change_pin(current.as_str(), new_pin.as_str())
        .await?;
    if !outcome.is_valid() {
        report(&outcome);
        bail!("PIN not changed");
    }
    println!("{} PIN changed", style("✓").green());
    Ok(())
}

async fn remove(app: &App) -> Result<()> {
    if !app.controller.is_pin_set() {
        println!("No PIN is set.");
        return Ok(());
    }
    verify_current(app).await?;
    app.controller.remove_pin().await.context("remove PIN")?;
    println!("{} PIN removed", style("✓").green());
    Ok(())
}

fn report(outcome: &PinVerification) {
    match outcome.reason() {
        None => println!("{} unlocked", style("✓").green()),
        Some(reason) => println!("{}", style(reason).red()),
    }
}
