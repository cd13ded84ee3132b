use serde::{Deserialize, Serialize};

use super::{ClientProvider, Clients, User};
use crate::{AppError, AppResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AccountResponse {
    local_id: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}

impl From<AccountResponse> for User {
    fn from(account: AccountResponse) -> Self {
        User {
            id: account.local_id,
            display_name: account.display_name.filter(|name| !name.is_empty()),
            photo_url: account.photo_url.filter(|url| !url.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

async fn call<B: Serialize>(http_client: &reqwest::Client, url: String, body: &B) -> AppResult<User> {
    let response = http_client.post(url).json(body).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(ErrorResponse { error }) => error.message,
            Err(_) => status.to_string(),
        };
        return Err(AppError::Other(anyhow::anyhow!("identity provider refused: {message}")));
    }
    Ok(response.json::<AccountResponse>().await?.into())
}

/// Trades a provider access token for a Firebase account.
pub(super) async fn sign_in_with_idp(
    http_client: &reqwest::Client,
    clients: &Clients,
    provider: ClientProvider,
    access_token: &str,
    request_uri: &str,
) -> AppResult<User> {
    call(http_client, clients.identity_url("signInWithIdp"), &SignInWithIdpRequest {
        post_body: format!("access_token={access_token}&providerId={}", provider.id()),
        request_uri: request_uri.to_owned(),
        return_idp_credential: true,
        return_secure_token: true,
    }).await
}

pub(super) async fn sign_up_anonymous(http_client: &reqwest::Client, clients: &Clients) -> AppResult<User> {
    call(http_client, clients.identity_url("signUp"), &SignUpRequest {
        return_secure_token: true,
    }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_maps_to_user() {
        let account: AccountResponse = serde_json::from_str(
            r#"{"localId":"abc","displayName":"Ada","photoUrl":"https://img/1.png","idToken":"t"}"#,
        )
        .unwrap();
        assert_eq!(
            User::from(account),
            User {
                id: "abc".into(),
                display_name: Some("Ada".into()),
                photo_url: Some("https://img/1.png".into()),
            }
        );
    }

    #[test]
    fn anonymous_account_has_no_profile() {
        let account: AccountResponse = serde_json::from_str(r#"{"localId":"anon","displayName":""}"#).unwrap();
        let user = User::from(account);
        assert_eq!(user.display_name, None);
        assert_eq!(user.photo_url, None);
    }
}
