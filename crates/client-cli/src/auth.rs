//! Client session: the bearer token and the user it belongs to.

use anyhow::Result;
use shared::{LoginRequest, UserSummary};

use crate::api::ApiClient;
use crate::config::Config;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub token: Option<String>,
    pub user: Option<UserSummary>,
}

impl AuthContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token: config.remote.token.clone(),
            user: config.remote.user.clone(),
        }
    }

    /// A token given on the command line replaces the stored one for this run.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.token = token;
        }
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    /// Write this session into the config, replacing any previous one.
    pub fn store(&self, config: &mut Config) {
        config.remote.token = self.token.clone();
        config.remote.user = self.user.clone();
    }

    pub fn client(&self, server: &str) -> ApiClient {
        ApiClient::new(server, self.token.clone())
    }
}

/// Exchange credentials for a token and persist the session. Only the
/// session is written back; `server` is not saved.
pub async fn login(
    config: &mut Config,
    server: &str,
    email: &str,
    password: &str,
) -> Result<AuthContext> {
    let client = ApiClient::new(server, None);
    let resp = client
        .login(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await?;

    let auth = AuthContext {
        token: Some(resp.token),
        user: Some(resp.user),
    };
    auth.store(config);
    config.save()?;

    tracing::info!("Logged in to {}", server);
    Ok(auth)
}

/// Logout by clearing the stored session
pub fn logout(config: &mut Config) -> Result<()> {
    AuthContext::default().store(config);
    config.save()?;
    println!("\x1b[32m✅ Logged out successfully\x1b[0m");
    Ok(())
}

/// Show current login status
pub async fn whoami(auth: &AuthContext, server: &str) -> Result<()> {
    if !auth.is_logged_in() {
        println!("\x1b[33m✗ Not logged in\x1b[0m");
        println!("Run '\x1b[1mmedchat login\x1b[0m' to authenticate");
        return Ok(());
    }

    // The stored token may have expired; the profile call checks it
    match auth.client(server).profile().await {
        Ok(profile) => {
            println!("\x1b[32m✓ Logged in\x1b[0m");
            println!("Server: {}", server);
            println!(
                "User:   {} {} <{}>",
                profile.first_name, profile.last_name, profile.email
            );
        }
        Err(e) => {
            println!("\x1b[33m✗ Stored session is not valid: {}\x1b[0m", e);
            println!("Run '\x1b[1mmedchat login\x1b[0m' to authenticate");
        }
    }
    Ok(())
}
