use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::api::client::ApiClient;
use crate::api::models::Role;
use crate::app::AppState;
use crate::error::{ChatError, Result};
use crate::utils::normalize_url;

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    let mut out = tokio::io::stdout();
    out.write_all(label.as_bytes()).await?;
    out.flush().await?;
    let line = lines
        .next_line()
        .await?
        .ok_or_else(|| ChatError::Config("input closed during login".into()))?;
    Ok(line.trim().to_string())
}

/// Asks for whatever is missing (server, role, credentials), logs in and stores the token.
pub async fn show_login(mut state: AppState) -> Result<AppState> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while state.base_url.is_empty() {
        state.base_url = normalize_url(&prompt(&mut lines, "Storefront URL: ").await?);
    }

    let role = prompt(&mut lines, "Log in as (customer/admin) [customer]: ").await?;
    state.role = match role.to_ascii_lowercase().as_str() {
        "admin" | "a" => Role::Admin,
        _ => Role::Customer,
    };

    let client = ApiClient::new(&state.base_url, None)?;
    match client.ping().await {
        Ok(status) => info!("server answered with HTTP {}", status),
        Err(e) => warn!("server check failed: {}", e),
    }

    loop {
        let email = prompt(&mut lines, "Email (leave empty to paste a token): ").await?;
        let token = if email.is_empty() {
            prompt(&mut lines, "Bearer token: ").await?
        } else {
            let password = prompt(&mut lines, "Password: ").await?;
            match client.login(state.role, &email, &password).await {
                Ok(token) => token,
                Err(e) => {
                    println!("Login failed: {}", e);
                    continue;
                }
            }
        };
        if token.is_empty() {
            println!("A token is required.");
            continue;
        }
        state.token = Some(token);
        break;
    }

    if let Err(e) = state.save() {
        println!("Failed to save settings: {}", e);
    }
    Ok(state)
}
