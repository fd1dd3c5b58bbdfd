//! `token` subcommands working on the session file.

use anyhow::Result;
use log::debug;

use super::config::Options;
use crate::auth::{AUTH_TOKEN_KEY, TokenStore};

/// Stores the bearer token used by later commands.
pub fn set(options: &Options, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("The token must not be empty.");
    }
    let store = options.token_store()?;
    store.set(AUTH_TOKEN_KEY, token)?;
    debug!("Token saved to {}", store.path().display());
    println!("Token saved.");
    Ok(())
}

/// Removes the stored token. Succeeds when none is stored.
pub fn clear(options: &Options) -> Result<()> {
    options.token_store()?.remove(AUTH_TOKEN_KEY)?;
    println!("Token cleared.");
    Ok(())
}

/// Prints the stored token, or a note when there is none.
pub fn show(options: &Options) -> Result<()> {
    match options.token_store()?.get(AUTH_TOKEN_KEY) {
        Some(token) => println!("{}", token),
        None => println!("No token stored."),
    }
    Ok(())
}
