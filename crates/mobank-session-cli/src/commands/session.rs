/*
[INPUT]:  Credentials typed by the user, stored session state
[OUTPUT]: Login/registration/logout side effects and a status report
[POS]:    CLI session subcommands
[UPDATE]: When session lifecycle commands change
*/

use anyhow::{Context, Result, anyhow};
use chrono::{Local, Utc};
use console::style;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use mobank_session::{LoginCredentials, PinStatus, RegisterRequest, LockState};

use super::App;

pub async fn login(app: &App, username: Option<String>) -> Result<()> {
    let theme = ColorfulTheme::default();
    let username = match username {
        Some(username) => username,
        None => Input::with_theme(&theme)
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;

    let credentials = LoginCredentials::new(username, password);
    let pair = app.session.login(&credentials).await.context("login")?;

    let expiry = pair
        .access
        .expires_at
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "{} logged in as {} (access token valid until {})",
        style("✓").green(),
        style(&credentials.username).bold(),
        expiry
    );
    Ok(())
}

pub async fn register(app: &App, username: Option<String>, fields: Vec<(String, String)>) -> Result<()> {
    let theme = ColorfulTheme::default();
    let username = match username {
        Some(username) => username,
        None => Input::with_theme(&theme)
            .with_prompt("Username")
            .interact_text()?,
    };
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .with_confirmation("Repeat password", "Passwords do not match")
        .interact()?;

    let mut request = RegisterRequest::new(username, password);
    for (key, value) in fields {
        let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
        request = request.with_field(key, value);
    }

    if app.session.register(&request).await.context("register")? {
        println!("{} account created and signed in", style("✓").green());
    } else {
        println!(
            "{} account created; run `mobank login` to sign in",
            style("✓").green()
        );
    }
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    app.session.logout().await.context("logout")?;
    println!("{} logged out", style("✓").green());
    Ok(())
}

pub async fn status(app: &App) -> Result<()> {
    println!("{}", style("Session").bold().cyan());
    println!("  store:        {}", app.store_path.display());
    println!("  api:          {}", app.config.api.base_url);

    match app.session.tokens().current_pair().await? {
        Some(pair) => {
            let now = Utc::now();
            let access = match pair.access.expires_at {
                Some(at) if at <= now => style("expired".to_string()).red(),
                Some(at) => style(format!("valid for {}s", (at - now).num_seconds())).green(),
                None => style("no expiry".to_string()).green(),
            };
            println!("  signed in:    yes (access token {access})");
        }
        None => println!("  signed in:    {}", style("no").yellow()),
    }
    if let Some(last) = app.session.last_login().await? {
        println!(
            "  last login:   {}",
            last.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!(
        "  onboarding:   {}",
        if app.session.is_onboarding_complete().await? {
            "complete"
        } else {
            "pending"
        }
    );

    println!("{}", style("App lock").bold().cyan());
    let pin = match app.controller.status() {
        PinStatus::NotConfigured => "not configured".to_string(),
        PinStatus::Configured(LockState::Locked) => "configured (locked)".to_string(),
        PinStatus::Configured(LockState::Unlocked) => "configured (unlocked)".to_string(),
    };
    println!("  pin:          {pin}");
    if let Some(length) = app.controller.pin_length() {
        println!("  digits:       {}", length.digits());
    }
    println!(
        "  biometric:    {}",
        if app.controller.is_biometric_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  auto-lock:    {}s",
        app.controller.inactivity_timeout().as_secs()
    );
    let failed = app.controller.failed_attempts();
    if failed > 0 {
        println!("  failed tries: {failed}/{}", app.config.pin.max_attempts);
    }
    if let Some(remaining) = app.controller.lockout_remaining() {
        println!(
            "  {}",
            style(format!("locked out for another {}s", remaining.as_secs().max(1))).red()
        );
    }
    Ok(())
}

/// `key=value` pairs for registration profile fields.
pub fn parse_field(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("field name cannot be empty"));
    }
    Ok((key.to_string(), value.to_string()))
}
