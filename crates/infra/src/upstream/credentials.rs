//! The bot/user credential pair handed to actions.

use tracing::{info, instrument};

use super::models::CreateAccessTokenOption;
use super::{UpstreamClient, UpstreamError};

/// Both authenticated views of the upstream service for one piece of work.
///
/// `bot` is the service's own identity, shared for the process lifetime and
/// used for administrative calls. `user` acts for whoever submitted the
/// request and is built from their session token.
#[derive(Debug, Clone)]
pub struct Clients {
    pub bot: UpstreamClient,
    pub user: UpstreamClient,
}

impl Clients {
    pub fn new(bot: UpstreamClient, user: UpstreamClient) -> Self {
        Self { bot, user }
    }

    /// Pair the shared bot client with a user's session token.
    pub fn for_user_token(bot: &UpstreamClient, token: &str) -> Self {
        Self {
            user: bot.with_token(token),
            bot: bot.clone(),
        }
    }
}

/// Exchange a username and password for a long-lived access token.
///
/// The first existing token of the account is reused; an account without
/// tokens gets a new one named `token_name`.
#[instrument(skip(server, password), fields(server = %server.base_url()), err)]
pub async fn login_exchange(
    server: &UpstreamClient,
    username: &str,
    password: &str,
    token_name: &str,
) -> Result<String, UpstreamError> {
    let tokens = server.list_access_tokens(username, password).await?;
    if let Some(existing) = tokens.into_iter().next() {
        return Ok(existing.sha1);
    }

    info!(username, token_name, "no access token found, creating one");
    let created = server
        .create_access_token(
            username,
            password,
            &CreateAccessTokenOption {
                name: token_name.to_string(),
            },
        )
        .await?;
    Ok(created.sha1)
}
