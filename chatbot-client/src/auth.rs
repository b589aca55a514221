//! Login, registration and logout against the persisted session

use chatbot_core::SessionStore;
use tracing::info;

use crate::api::ApiClient;
use crate::error::ClientResult;

/// Log in and persist the issued token
pub async fn sign_in(
    api: &ApiClient,
    session: &mut SessionStore,
    username: &str,
    password: &str,
) -> ClientResult<()> {
    let token = api.login(username, password).await?;
    session.set_token(&token.access_token)?;
    info!("Logged in as {}", username);
    Ok(())
}

/// Register, then log in with the same credentials
pub async fn sign_up(
    api: &ApiClient,
    session: &mut SessionStore,
    username: &str,
    password: &str,
) -> ClientResult<()> {
    let registered = api.register(username, password).await?;
    info!("Registered {}: {}", username, registered.message);
    sign_in(api, session, username, password).await
}

/// Forget the persisted token
pub fn sign_out(session: &mut SessionStore) -> ClientResult<()> {
    session.clear()?;
    Ok(())
}
