use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use plotpot_types::models::{Challenge, NewChallenge};
use plotpot_types::{Backend, Query, Table};

use crate::error::ClientError;
use crate::repository::{decode_row, decode_rows, detached, encode, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation::{self, ValidationError};

pub struct ChallengeRepository<B> {
    inner: Arc<ChallengeInner<B>>,
}

struct ChallengeInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    challenges: Slot<Vec<Challenge>>,
    create_state: Slot<Challenge>,
}

impl<B> Clone for ChallengeRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> ChallengeRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(ChallengeInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                challenges: Slot::new(),
                create_state: Slot::new(),
            }),
        }
    }

    pub fn challenges(&self) -> Slot<Vec<Challenge>> {
        self.inner.challenges.clone()
    }

    pub fn create_state(&self) -> Slot<Challenge> {
        self.inner.create_state.clone()
    }

    /// Active challenges, earliest start first.
    pub async fn fetch_active(&self) -> Result<Vec<Challenge>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.challenges.begin();
        detached(async move {
            let result = async {
                let query = Query::from(Table::Challenges)
                    .eq("is_active", true)
                    .order("start_date", true);
                decode_rows::<Challenge>("Challenge", inner.backend.select(&query).await?)
            }
            .await;
            if let Ok(challenges) = &result {
                debug!("Fetched {} active challenges", challenges.len());
            }
            settle(&inner.challenges, ticket, result)
        })
        .await
    }

    /// Publish a new, active challenge running from `start` to `end`.
    pub async fn create_challenge(
        &self,
        title: &str,
        description: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Challenge, ClientError> {
        let slot = &self.inner.create_state;
        preflight(slot, validate_draft(title, description, start, end))?;
        preflight(slot, self.inner.gate.require())?;

        let draft = NewChallenge {
            title: title.trim().to_string(),
            description: description.map(str::to_string),
            start_date: start,
            end_date: end,
            is_active: true,
        };

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = async {
                let row = this
                    .inner
                    .backend
                    .insert(Table::Challenges, encode("Challenge", &draft)?)
                    .await?;
                decode_row::<Challenge>("Challenge", row)
            }
            .await;
            let challenge = settle(&this.inner.create_state, ticket, result)?;
            info!("Created challenge {} ({:?})", challenge.id, challenge.title);

            let _ = this.fetch_active().await;
            Ok(challenge)
        })
        .await
    }
}

fn validate_draft(
    title: &str,
    description: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), ValidationError> {
    validation::title(title)?;
    validation::description(description)?;
    validation::challenge_window(start, end)
}
