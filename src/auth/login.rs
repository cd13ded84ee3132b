use axum::{debug_handler, extract::{Path, Query, State}, response::{Html, IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{include_res, res, session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, current_user, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
    pub(crate) error: Option<String>,
}

#[debug_handler]
pub(crate) async fn login_page(
    Query(LoginQuery { return_url, error }): Query<LoginQuery>,
    session: Session,
) -> AppResult<Response> {
    if current_user(&session).await?.is_some() {
        return Ok(Redirect::to("/lobby").into_response());
    }
    if let Some(return_url) = return_url.filter(|url| is_local(url)) {
        session.insert(RETURN_URL, return_url).await?;
    }

    let error = error
        .map(|error| format!(r#"<p class="error">{}</p>"#, res::escape(&error)))
        .unwrap_or_default();

    Ok(Html(res::fill(include_res!(str, "/pages/login.html"), &[("error", &error)])).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url, .. }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(provider.scope().to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url.filter(|url| is_local(url)) {
        session.insert(RETURN_URL, return_url).await?;
    }

    tracing::debug!(%provider, "redirecting to identity provider");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}

/// Only same-site paths are followed after login.
pub(crate) fn is_local(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}
