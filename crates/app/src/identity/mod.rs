//! The Identity Provider boundary.
//!
//! Accounts, sessions and credential-setup emails live with an external
//! provider. [`IdentityProvider`] is the slice of it the services need:
//! reading the current session, signing out, and the two ways of creating an
//! account for a new tutor (an emailed invitation, or direct creation with a
//! temporary password followed by a password-recovery email).

pub mod memory;
pub mod supabase;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tutaville_core::{Email, Role, UserId};

pub use memory::{Delivery, MemoryIdentity};
pub use supabase::SupabaseAuth;

/// The signed-in user, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<Email>,
}

/// Profile details attached to a new account as user metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
}

/// An account that now exists at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub email: Email,
}

/// Errors raised by an [`IdentityProvider`].
#[derive(Debug, Error)]
pub enum IdentityError {
    /// An account with this email already exists.
    #[error("email is already registered")]
    AlreadyRegistered,

    /// The provider does not support email invitations.
    #[error("email invitations are not supported by the identity provider")]
    InviteUnsupported,

    /// The access token is missing, expired or revoked.
    #[error("no active session")]
    NoSession,

    /// The provider refused the request.
    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the response body.
        message: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("identity provider timed out")]
    Timeout,

    /// The provider could not be reached.
    #[error("identity provider transport error: {0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("invalid identity provider response: {0}")]
    InvalidResponse(String),

    /// An account-creating call succeeded but its reply could not be read.
    ///
    /// The account exists at the provider, but its id is unknown.
    #[error("account was created but the identity provider reply was unreadable: {0}")]
    UnreadableAccount(String),
}

impl IdentityError {
    /// Timeouts, transport failures and 5xx rejections may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether an account may have been created despite the error.
    #[must_use]
    pub const fn account_may_exist(&self) -> bool {
        matches!(self, Self::UnreadableAccount(_))
    }
}

/// Account and session operations consumed by the services.
pub trait IdentityProvider: Send + Sync {
    /// The current session, or `None` when signed out.
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Create an account and email the user a link to set their password.
    ///
    /// Fails with [`IdentityError::AlreadyRegistered`] if the address is
    /// taken and [`IdentityError::InviteUnsupported`] if the provider cannot
    /// send invitations.
    async fn invite_by_email(
        &self,
        email: &Email,
        metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError>;

    /// Create a confirmed account with the given password.
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError>;

    /// Email a password-reset link to `email`.
    async fn send_password_recovery(&self, email: &Email) -> Result<(), IdentityError>;
}
