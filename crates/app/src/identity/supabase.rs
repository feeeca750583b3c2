//! Supabase Auth (`GoTrue`) client.
//!
//! Talks to the `/auth/v1` REST endpoints of a Supabase project:
//!
//! | Operation | Endpoint | Key |
//! |-----------|----------|-----|
//! | current session | `GET /auth/v1/user` | user access token |
//! | sign out | `POST /auth/v1/logout` | user access token |
//! | invite | `POST /auth/v1/invite` | service role |
//! | create account | `POST /auth/v1/admin/users` | service role |
//! | password recovery | `POST /auth/v1/recover` | service role |
//!
//! The service-role key bypasses row-level security; it must only be used
//! from trusted operator tooling, never shipped to a browser.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use tutaville_core::{Email, UserId};

use super::{Account, AccountMetadata, IdentityError, IdentityProvider, Session};
use crate::config::SupabaseConfig;

/// Supabase Auth client.
#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    /// Project URL, always ending in `/`.
    base_url: Url,
    service_role_key: SecretString,
    anon_key: Option<SecretString>,
    access_token: Option<SecretString>,
    invite_redirect: Option<Url>,
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("base_url", &self.base_url.as_str())
            .field("service_role_key", &"[REDACTED]")
            .field("has_session", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct InviteRequest<'a> {
    email: &'a str,
    data: &'a AccountMetadata,
}

#[derive(Serialize)]
struct CreateUserRequest<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: &'a AccountMetadata,
}

#[derive(Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
}

/// `GoTrue` error bodies vary by version; every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn message(&self) -> String {
        self.msg
            .as_ref()
            .or(self.message.as_ref())
            .or(self.error_description.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn is_already_registered(&self) -> bool {
        matches!(
            self.error_code.as_deref(),
            Some("email_exists" | "user_already_exists")
        ) || self.message().contains("already been registered")
    }
}

/// Which endpoint produced an error response, for status classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Session,
    Invite,
    Admin,
}

fn classify(call: Call, status: StatusCode, body: &ErrorBody) -> IdentityError {
    if body.is_already_registered() {
        return IdentityError::AlreadyRegistered;
    }
    match (call, status) {
        (Call::Session, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            IdentityError::NoSession
        }
        (Call::Invite, StatusCode::NOT_FOUND | StatusCode::NOT_IMPLEMENTED) => {
            IdentityError::InviteUnsupported
        }
        _ => IdentityError::Rejected {
            status: status.as_u16(),
            message: body.message(),
        },
    }
}

fn transport(err: &reqwest::Error) -> IdentityError {
    if err.is_timeout() {
        IdentityError::Timeout
    } else {
        IdentityError::Transport(err.to_string())
    }
}

impl SupabaseAuth {
    /// Build a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let mut base_url = config.url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            service_role_key: config.service_role_key.clone(),
            anon_key: config.anon_key.clone(),
            access_token: None,
            invite_redirect: config.invite_redirect_url.clone(),
        })
    }

    /// Act on behalf of the user holding `token`.
    #[must_use]
    pub fn with_access_token(mut self, token: SecretString) -> Self {
        self.access_token = Some(token);
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::InvalidResponse(format!("bad endpoint {path}: {e}")))
    }

    fn with_redirect(&self, mut url: Url) -> Url {
        if let Some(redirect) = &self.invite_redirect {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect.as_str());
        }
        url
    }

    fn as_service(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.service_role_key.expose_secret())
            .bearer_auth(self.service_role_key.expose_secret())
    }

    fn as_user(&self, request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        let apikey = self.anon_key.as_ref().unwrap_or(&self.service_role_key);
        request
            .header("apikey", apikey.expose_secret())
            .bearer_auth(token.expose_secret())
    }

    async fn check(call: Call, response: Response) -> Result<Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let err = classify(call, status, &body);
        debug!(status = status.as_u16(), error = %err, "Supabase auth request failed");
        Err(err)
    }

    /// Read the account out of a successful invite or create response.
    async fn account_from(response: Response) -> Result<Account, IdentityError> {
        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::UnreadableAccount(e.to_string()))?;
        account_of(user)
    }
}

fn account_of(user: UserResponse) -> Result<Account, IdentityError> {
    let email = user
        .email
        .as_deref()
        .map(Email::parse)
        .transpose()
        .map_err(|e| IdentityError::UnreadableAccount(e.to_string()))?
        .ok_or_else(|| IdentityError::UnreadableAccount("user has no email".to_owned()))?;
    Ok(Account {
        user_id: UserId::from_uuid(user.id),
        email,
    })
}

impl IdentityProvider for SupabaseAuth {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        let Some(token) = &self.access_token else {
            return Ok(None);
        };
        let request = self.as_user(self.client.get(self.endpoint("auth/v1/user")?), token);
        let response = request.send().await.map_err(|e| transport(&e))?;
        let response = match Self::check(Call::Session, response).await {
            Ok(response) => response,
            Err(IdentityError::NoSession) => return Ok(None),
            Err(e) => return Err(e),
        };

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        let email = match user.email.as_deref().filter(|e| !e.is_empty()) {
            Some(raw) => match Email::parse(raw) {
                Ok(email) => Some(email),
                Err(e) => {
                    warn!(error = %e, "Session email is not a valid address");
                    None
                }
            },
            None => None,
        };
        Ok(Some(Session {
            user_id: UserId::from_uuid(user.id),
            email,
        }))
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), IdentityError> {
        let Some(token) = &self.access_token else {
            return Ok(());
        };
        let request = self.as_user(self.client.post(self.endpoint("auth/v1/logout")?), token);
        let response = request.send().await.map_err(|e| transport(&e))?;
        match Self::check(Call::Session, response).await {
            Ok(_) | Err(IdentityError::NoSession) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, metadata), fields(email = %email))]
    async fn invite_by_email(
        &self,
        email: &Email,
        metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError> {
        let url = self.with_redirect(self.endpoint("auth/v1/invite")?);
        let response = self
            .as_service(self.client.post(url))
            .json(&InviteRequest {
                email: email.as_str(),
                data: metadata,
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let account = Self::account_from(Self::check(Call::Invite, response).await?).await?;
        debug!(user_id = %account.user_id, "Invitation sent");
        Ok(account)
    }

    #[instrument(skip(self, password, metadata), fields(email = %email))]
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError> {
        let response = self
            .as_service(self.client.post(self.endpoint("auth/v1/admin/users")?))
            .json(&CreateUserRequest {
                email: email.as_str(),
                password: password.expose_secret(),
                email_confirm: true,
                user_metadata: metadata,
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let account = Self::account_from(Self::check(Call::Admin, response).await?).await?;
        debug!(user_id = %account.user_id, "Account created");
        Ok(account)
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn send_password_recovery(&self, email: &Email) -> Result<(), IdentityError> {
        let url = self.with_redirect(self.endpoint("auth/v1/recover")?);
        let response = self
            .as_service(self.client.post(url))
            .json(&RecoverRequest {
                email: email.as_str(),
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        Self::check(Call::Admin, response).await?;
        Ok(())
    }
}
