use axum::{debug_handler, extract::{Path, Query, State}, response::Redirect};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{config::Config, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, firebase, login_error_url, sign_in, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// OAuth callback. Failures land back on the login page with the reason.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(query): Query<LockinQuery>,
    State(clients): State<Clients>,
    State(config): State<Config>,
    session: Session,
) -> Redirect {
    match finish_login(provider, query, &clients, &config, &session).await {
        Ok(return_url) => Redirect::to(&return_url),
        Err(e) => {
            tracing::warn!(%provider, error = %e, "federated sign-in failed");
            Redirect::to(&login_error_url(&format!("Sign-in with {provider} failed: {e}")))
        }
    }
}

async fn finish_login(
    provider: ClientProvider,
    LockinQuery { state, code, error }: LockinQuery,
    clients: &Clients,
    config: &Config,
    session: &Session,
) -> AppResult<String> {
    if let Some(error) = error {
        return Err(format!("provider said {error}"))?;
    }
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state")?;
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match")?;
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier")?;
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let user = firebase::sign_in_with_idp(&http_client, clients, provider, access_token, &config.public_url).await?;

    let return_url = session.remove::<String>(RETURN_URL).await?;
    sign_in(session, user).await?;

    Ok(return_url.unwrap_or("/lobby".to_string()))
}
