//! In-memory [`IdentityProvider`] for tests and local tooling.

use std::collections::HashMap;

use secrecy::SecretString;
use tokio::sync::Mutex;

use tutaville_core::{Email, UserId};

use super::{Account, AccountMetadata, IdentityError, IdentityProvider, Session};

/// Something the provider would have emailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Invitation(Email),
    PasswordRecovery(Email),
}

#[derive(Debug)]
struct State {
    accounts: HashMap<Email, UserId>,
    session: Option<Session>,
    invites_supported: bool,
    next_error: Option<IdentityError>,
    recovery_error: Option<IdentityError>,
    deliveries: Vec<Delivery>,
}

/// Accounts and a single session held in process.
#[derive(Debug)]
pub struct MemoryIdentity {
    state: Mutex<State>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                accounts: HashMap::new(),
                session: None,
                invites_supported: true,
                next_error: None,
                recovery_error: None,
                deliveries: Vec::new(),
            }),
        }
    }
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and sign it in.
    pub async fn sign_in(&self, email: &Email) -> Session {
        let mut state = self.state.lock().await;
        let user_id = *state
            .accounts
            .entry(email.clone())
            .or_insert_with(UserId::generate);
        let session = Session {
            user_id,
            email: Some(email.clone()),
        };
        state.session = Some(session.clone());
        session
    }

    /// Toggle support for email invitations.
    pub async fn set_invites_supported(&self, supported: bool) {
        self.state.lock().await.invites_supported = supported;
    }

    /// Fail the next invite or account creation with `err`.
    pub async fn fail_next(&self, err: IdentityError) {
        self.state.lock().await.next_error = Some(err);
    }

    /// Fail the next password-recovery request with `err`.
    pub async fn fail_recovery(&self, err: IdentityError) {
        self.state.lock().await.recovery_error = Some(err);
    }

    /// Emails sent so far, oldest first.
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.state.lock().await.deliveries.clone()
    }

    /// Number of accounts that exist.
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    async fn register(&self, email: &Email, invite: bool) -> Result<Account, IdentityError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }
        if invite && !state.invites_supported {
            return Err(IdentityError::InviteUnsupported);
        }
        if state.accounts.contains_key(email) {
            return Err(IdentityError::AlreadyRegistered);
        }

        let user_id = UserId::generate();
        state.accounts.insert(email.clone(), user_id);
        if invite {
            state.deliveries.push(Delivery::Invitation(email.clone()));
        }
        Ok(Account {
            user_id,
            email: email.clone(),
        })
    }
}

impl IdentityProvider for MemoryIdentity {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        Ok(self.state.lock().await.session.clone())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.state.lock().await.session = None;
        Ok(())
    }

    async fn invite_by_email(
        &self,
        email: &Email,
        _metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError> {
        self.register(email, true).await
    }

    async fn create_account(
        &self,
        email: &Email,
        _password: &SecretString,
        _metadata: &AccountMetadata,
    ) -> Result<Account, IdentityError> {
        self.register(email, false).await
    }

    async fn send_password_recovery(&self, email: &Email) -> Result<(), IdentityError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.recovery_error.take() {
            return Err(err);
        }
        if !state.accounts.contains_key(email) {
            return Err(IdentityError::Rejected {
                status: 404,
                message: "user not found".to_owned(),
            });
        }
        state
            .deliveries
            .push(Delivery::PasswordRecovery(email.clone()));
        Ok(())
    }
}
