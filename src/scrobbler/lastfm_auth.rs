// Interactive Last.fm session key helper, used by the `auth` subcommand

use anyhow::{Context, Result};
use rustfm_scrobble_proxy::Scrobbler;
use std::io::{self, BufRead, Write};

/// Ask for Last.fm credentials on the terminal and exchange them for a session key
pub fn obtain_session_key(api_key: &str, api_secret: &str) -> Result<String> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let username = prompt(&mut input, "Last.fm username: ")?;
    let password = prompt(&mut input, "Last.fm password: ")?;
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password are both required");
    }

    println!("\nAuthenticating with Last.fm as {}...", username);
    let mut scrobbler = Scrobbler::new(api_key, api_secret);
    let session = scrobbler
        .authenticate_with_password(&username, &password)
        .context("Last.fm rejected the credentials")?;

    Ok(session.key)
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}
