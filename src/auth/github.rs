use reqwest::header;
use serde::Deserialize;
use url::Url;

use crate::config::OauthConfig;
use crate::error::{AppError, AppResult};

const USER_AGENT: &str = concat!("retube/", env!("CARGO_PKG_VERSION"));

/// Client for the two-step GitHub OAuth handshake: redirect the browser to
/// the authorize endpoint, then exchange the returned code for an access
/// token and read the profile + verified email list.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    config: OauthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl GithubClient {
    pub fn new(config: OauthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Build the authorize URL for the redirect step. Signup on the provider
    /// side is disallowed; we only want existing GitHub identities.
    pub fn authorization_url(&self) -> AppResult<String> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| AppError::Internal(format!("bad authorize_url in config: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("allow_signup", "false")
            .append_pair("scope", "read:user user:email");
        Ok(url.into())
    }

    /// Exchange the callback code for an access token. `None` means the
    /// provider declined to issue one (bad or expired code).
    pub async fn exchange_code(&self, code: &str) -> AppResult<Option<String>> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    pub async fn fetch_profile(&self, access_token: &str) -> AppResult<GithubProfile> {
        let response = self
            .http
            .get(format!("{}/user", self.config.api_url))
            .header(header::USER_AGENT, USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await?;

        Ok(response.json().await?)
    }

    pub async fn fetch_emails(&self, access_token: &str) -> AppResult<Vec<GithubEmail>> {
        let response = self
            .http
            .get(format!("{}/user/emails", self.config.api_url))
            .header(header::USER_AGENT, USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await?;

        Ok(response.json().await?)
    }
}

/// Select the address the provider marks both primary and verified. Accounts
/// may carry any number of extra addresses; only this one links identities.
pub fn primary_verified_email(emails: &[GithubEmail]) -> Option<&str> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GithubClient {
        GithubClient::new(OauthConfig {
            client_id: "my-client-id".to_string(),
            client_secret: "secret".to_string(),
            ..OauthConfig::default()
        })
    }

    #[test]
    fn authorization_url_carries_client_id_and_scopes() {
        let url = client().authorization_url().unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("github.com"));

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".into(), "my-client-id".into())));
        assert!(pairs.contains(&("allow_signup".into(), "false".into())));
        assert!(pairs.contains(&("scope".into(), "read:user user:email".into())));
    }

    #[test]
    fn token_response_tolerates_missing_token() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"error": "bad_verification_code"}"#).unwrap();
        assert!(body.access_token.is_none());

        let body: TokenResponse =
            serde_json::from_str(r#"{"access_token": "gho_abc", "token_type": "bearer"}"#).unwrap();
        assert_eq!(body.access_token.as_deref(), Some("gho_abc"));
    }

    #[test]
    fn primary_verified_email_skips_unverified_primary() {
        let emails = vec![
            GithubEmail {
                email: "primary@example.com".into(),
                primary: true,
                verified: false,
            },
            GithubEmail {
                email: "secondary@example.com".into(),
                primary: false,
                verified: true,
            },
        ];
        assert_eq!(primary_verified_email(&emails), None);
    }

    #[test]
    fn primary_verified_email_picks_the_right_one() {
        let emails = vec![
            GithubEmail {
                email: "old@example.com".into(),
                primary: false,
                verified: true,
            },
            GithubEmail {
                email: "me@example.com".into(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(primary_verified_email(&emails), Some("me@example.com"));
    }

    #[test]
    fn primary_verified_email_empty_list() {
        assert_eq!(primary_verified_email(&[]), None);
    }
}
