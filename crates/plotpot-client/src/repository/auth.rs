use std::sync::Arc;

use tracing::{info, warn};

use plotpot_types::api::User;
use plotpot_types::models::NewProfile;
use plotpot_types::{Backend, Table, UiState};

use crate::error::ClientError;
use crate::repository::profile::load_profile;
use crate::repository::{detached, encode, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation::{self, ValidationError};

/// Sign-up, sign-in and the signed-in user.
pub struct AuthRepository<B> {
    inner: Arc<AuthInner<B>>,
}

struct AuthInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    user: Slot<User>,
}

impl<B> Clone for AuthRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> AuthRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                user: Slot::new(),
            }),
        }
    }

    /// Outcome of the latest sign-up or sign-in; back to `Initial` after sign-out.
    pub fn user(&self) -> Slot<User> {
        self.inner.user.clone()
    }

    /// Create an account and its profile row, leaving the new user signed in.
    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<User, ClientError> {
        let slot = &self.inner.user;
        preflight(slot, validate_sign_up(email, password, username))?;

        let email = email.trim().to_string();
        let password = password.to_string();
        let username = username.trim().to_string();

        let inner = Arc::clone(&self.inner);
        let ticket = slot.begin();
        detached(async move {
            let result = async {
                let identity = inner.backend.sign_up(&email, &password).await?;

                let profile = NewProfile {
                    id: identity.id,
                    username: username.clone(),
                    avatar_url: None,
                    bio: None,
                };
                inner
                    .backend
                    .insert(Table::Profiles, encode("Profile", &profile)?)
                    .await?;

                Ok::<_, ClientError>(User {
                    id: identity.id,
                    email: identity.email.unwrap_or_else(|| email.clone()),
                    username: username.clone(),
                })
            }
            .await;
            let user = settle(&inner.user, ticket, result)?;
            info!("Signed up {} as {:?}", user.id, user.username);
            Ok(user)
        })
        .await
    }

    /// Sign in and load the user's profile. An account without a profile row
    /// fails with `Profile not found` and is signed out again, so a failed
    /// sign-in never leaves a session behind.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let slot = &self.inner.user;
        preflight(slot, validate_sign_in(email, password))?;
        let email = email.trim().to_string();
        let password = password.to_string();

        let inner = Arc::clone(&self.inner);
        let ticket = slot.begin();
        detached(async move {
            let result = async {
                let identity = inner.backend.sign_in(&email, &password).await?;
                let profile = match load_profile(&*inner.backend, identity.id).await {
                    Ok(Some(profile)) => profile,
                    Ok(None) => {
                        let missing = ClientError::NotFound("Profile");
                        return Err(abandon_session(&*inner.backend, missing).await);
                    }
                    Err(e) => return Err(abandon_session(&*inner.backend, e).await),
                };

                Ok::<_, ClientError>(User {
                    id: identity.id,
                    email: identity.email.unwrap_or_else(|| email.clone()),
                    username: profile.username,
                })
            }
            .await;
            let user = settle(&inner.user, ticket, result)?;
            info!("Signed in {}", user.id);
            Ok(user)
        })
        .await
    }

    pub async fn sign_out(&self) -> Result<(), ClientError> {
        match self.inner.backend.sign_out().await {
            Ok(()) => {
                self.inner.user.set(UiState::Initial);
                info!("Signed out");
                Ok(())
            }
            Err(e) => {
                let e = ClientError::from(e);
                warn!("Sign-out failed: {}", e);
                self.inner.user.set(UiState::Error(e.user_message()));
                Err(e)
            }
        }
    }

    /// The signed-in user with their profile username, or `None` when nobody
    /// is signed in.
    pub async fn current_user(&self) -> Result<Option<User>, ClientError> {
        let Some(identity) = self.inner.gate.current() else {
            return Ok(None);
        };

        let profile = load_profile(&*self.inner.backend, identity.id)
            .await?
            .ok_or(ClientError::NotFound("Profile"))?;
        Ok(Some(User {
            id: identity.id,
            email: identity.email.unwrap_or_default(),
            username: profile.username,
        }))
    }

    /// Navigation gate: true while a session identity exists.
    pub fn is_signed_in(&self) -> bool {
        self.inner.gate.current().is_some()
    }
}

/// End a session whose sign-in could not be completed and hand back the
/// error that caused it.
async fn abandon_session<B: Backend>(backend: &B, cause: ClientError) -> ClientError {
    if let Err(e) = backend.sign_out().await {
        warn!("Sign-out after failed sign-in failed: {}", e);
    }
    cause
}

fn validate_sign_up(email: &str, password: &str, username: &str) -> Result<(), ValidationError> {
    validation::email(email)?;
    validation::new_password(password)?;
    validation::username(username)
}

fn validate_sign_in(email: &str, password: &str) -> Result<(), ValidationError> {
    validation::email(email)?;
    validation::password(password)
}
