//! Tenant access token acquisition.
//!
//! One token is requested per pipeline run and reused for every
//! subsequent call. There is no retry: a failed exchange aborts the run.

use tracing::info;

use crate::client::WikiApi;
use crate::error::{Result, WikiError};
use crate::models::AccessToken;

/// Exchange app credentials for a tenant access token.
///
/// Both credentials must be non-empty; this is checked before any network
/// call is made.
///
/// # Errors
///
/// [`WikiError::Auth`] carrying the remote code and message on any
/// failure (empty credentials use code `-1`).
pub async fn get_tenant_access_token(
    api: &dyn WikiApi,
    app_id: &str,
    app_secret: &str,
) -> Result<AccessToken> {
    if app_id.trim().is_empty() || app_secret.trim().is_empty() {
        return Err(WikiError::Auth {
            code: -1,
            msg: "app_id and app_secret must both be non-empty".to_string(),
        });
    }

    let grant = api.tenant_access_token(app_id, app_secret).await?;
    info!(app_id, expires_in = grant.expire, "tenant access token acquired");

    Ok(AccessToken {
        value: grant.tenant_access_token,
        app_id: app_id.to_string(),
        expires_in: grant.expire,
    })
}
