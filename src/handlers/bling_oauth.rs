// OAuth authorization flow: consent-screen redirect and code-exchange
// callback. Outcomes land on the admin settings page as query parameters.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;

use crate::AppState;

/// GET /admin/bling/authorize
pub async fn authorize(State(state): State<AppState>) -> Redirect {
    let redirect_uri = format!("{}/admin/bling/oauth/callback", state.public_url);

    match state.token_manager.authorization_url(&redirect_uri).await {
        Ok(url) => Redirect::temporary(&url),
        Err(err) => {
            tracing::error!("Failed to build Bling authorization URL: {err}");
            settings_redirect_error(&state, &err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /admin/bling/oauth/callback
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return settings_redirect_error(&state, "Authorization code missing.");
    };
    let Some(oauth_state) = query.state.filter(|value| !value.is_empty()) else {
        return settings_redirect_error(&state, "OAuth state missing.");
    };

    if state
        .token_manager
        .handle_oauth_callback(&code, &oauth_state)
        .await
    {
        Redirect::temporary(&format!("{}?auth_success=true", state.admin_ui_path))
    } else {
        settings_redirect_error(&state, "Failed to exchange code for token.")
    }
}

fn settings_redirect_error(state: &AppState, message: &str) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::temporary(&format!(
        "{}?auth_error=true&message={}",
        state.admin_ui_path, encoded
    ))
}
