use std::sync::{Arc, Mutex};

use tracing::info;
use uuid::Uuid;

use plotpot_types::models::{Profile, ProfileChanges};
use plotpot_types::{Backend, Filter, Query, Table, UiState};

use crate::error::ClientError;
use crate::repository::{decode_row, detached, encode, first_row, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation::{self, ValidationError};

pub struct ProfileRepository<B> {
    inner: Arc<ProfileInner<B>>,
}

struct ProfileInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    profile: Slot<Option<Profile>>,
    /// User whose profile the `profile` slot was last asked to show
    viewing: Mutex<Option<Uuid>>,
    update_state: Slot<Profile>,
}

impl<B> ProfileInner<B> {
    fn viewing(&self) -> std::sync::MutexGuard<'_, Option<Uuid>> {
        self.viewing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Show an updated profile, unless the slot is showing someone else.
    fn show_updated(&self, profile: &Profile) {
        let mut viewing = self.viewing();
        if viewing.is_none_or(|id| id == profile.id) {
            *viewing = Some(profile.id);
            self.profile.set(UiState::Success(Some(profile.clone())));
        }
    }
}

impl<B> Clone for ProfileRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> ProfileRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(ProfileInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                profile: Slot::new(),
                viewing: Mutex::new(None),
                update_state: Slot::new(),
            }),
        }
    }

    pub fn profile(&self) -> Slot<Option<Profile>> {
        self.inner.profile.clone()
    }

    pub fn update_state(&self) -> Slot<Profile> {
        self.inner.update_state.clone()
    }

    /// Profile of `user_id`; a user without a profile row is `Success(None)`.
    pub async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, ClientError> {
        *self.inner.viewing() = Some(user_id);

        let inner = Arc::clone(&self.inner);
        let ticket = inner.profile.begin();
        detached(async move {
            let result = load_profile(&*inner.backend, user_id).await;
            settle(&inner.profile, ticket, result)
        })
        .await
    }

    /// Update the signed-in user's own profile. The `profile` slot follows
    /// along only while it shows that user (or nobody yet).
    pub async fn update_profile(&self, changes: ProfileChanges) -> Result<Profile, ClientError> {
        let slot = &self.inner.update_state;
        preflight(slot, validate_changes(&changes))?;
        let identity = preflight(slot, self.inner.gate.require())?;

        let inner = Arc::clone(&self.inner);
        let ticket = slot.begin();
        detached(async move {
            let result = async {
                let filters = [Filter::Eq("id".into(), identity.id.to_string().into())];
                let rows = inner
                    .backend
                    .update(Table::Profiles, &filters, encode("Profile", &changes)?)
                    .await?;
                first_row::<Profile>("Profile", rows)
            }
            .await;
            let profile = settle(&inner.update_state, ticket, result)?;
            info!("Updated profile of {}", profile.id);

            inner.show_updated(&profile);
            Ok(profile)
        })
        .await
    }
}

pub(crate) async fn load_profile<B: Backend>(backend: &B, user_id: Uuid) -> Result<Option<Profile>, ClientError> {
    let rows = backend
        .select(&Query::from(Table::Profiles).eq("id", user_id.to_string()).limit(1))
        .await?;
    rows.into_iter()
        .next()
        .map(|row| decode_row("Profile", row))
        .transpose()
}

fn validate_changes(changes: &ProfileChanges) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::NoChanges);
    }
    if let Some(username) = &changes.username {
        validation::username(username)?;
    }
    validation::bio(changes.bio.as_deref())
}
