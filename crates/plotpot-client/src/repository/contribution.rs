use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use plotpot_types::models::{Contribution, ContributionWithDetails, NewContribution, Profile, Story};
use plotpot_types::{Backend, Query, Table};

use crate::error::ClientError;
use crate::repository::{decode_row, decode_rows, detached, encode, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation;

/// Shown when the story of a recent contribution is no longer readable.
const UNKNOWN_STORY: &str = "Untitled story";
/// Shown when the author has no profile row.
const UNKNOWN_AUTHOR: &str = "Anonymous";

pub struct ContributionRepository<B> {
    inner: Arc<ContributionInner<B>>,
}

struct ContributionInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    contributions: Slot<Vec<Contribution>>,
    recent: Slot<Vec<ContributionWithDetails>>,
    add_state: Slot<Contribution>,
}

impl<B> Clone for ContributionRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> ContributionRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(ContributionInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                contributions: Slot::new(),
                recent: Slot::new(),
                add_state: Slot::new(),
            }),
        }
    }

    pub fn contributions(&self) -> Slot<Vec<Contribution>> {
        self.inner.contributions.clone()
    }

    pub fn recent(&self) -> Slot<Vec<ContributionWithDetails>> {
        self.inner.recent.clone()
    }

    pub fn add_state(&self) -> Slot<Contribution> {
        self.inner.add_state.clone()
    }

    /// Sentences of one story, oldest first.
    pub async fn fetch_for_story(&self, story_id: i64) -> Result<Vec<Contribution>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.contributions.begin();
        detached(async move {
            let result = async {
                let query = Query::from(Table::Contributions)
                    .eq("story_id", story_id)
                    .order("created_at", true);
                decode_rows::<Contribution>("Contribution", inner.backend.select(&query).await?)
            }
            .await;
            if let Ok(contributions) = &result {
                debug!("Fetched {} contributions for story {}", contributions.len(), story_id);
            }
            settle(&inner.contributions, ticket, result)
        })
        .await
    }

    /// The latest `limit` contributions across all stories, newest first, with
    /// their story titles and author names resolved.
    pub async fn fetch_recent(&self, limit: usize) -> Result<Vec<ContributionWithDetails>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.recent.begin();
        detached(async move {
            let result = load_recent(&*inner.backend, limit).await;
            settle(&inner.recent, ticket, result)
        })
        .await
    }

    /// Append `sentence` to a story as the signed-in user. The sentence is
    /// stored exactly as given.
    pub async fn add_contribution(&self, story_id: i64, sentence: &str) -> Result<Contribution, ClientError> {
        let slot = &self.inner.add_state;
        preflight(slot, validation::sentence(sentence))?;
        let identity = preflight(slot, self.inner.gate.require())?;

        let draft = NewContribution {
            story_id,
            user_id: identity.id,
            sentence: sentence.to_string(),
        };

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = async {
                let row = this
                    .inner
                    .backend
                    .insert(Table::Contributions, encode("Contribution", &draft)?)
                    .await?;
                decode_row::<Contribution>("Contribution", row)
            }
            .await;
            let contribution = settle(&this.inner.add_state, ticket, result)?;
            info!("Added contribution {} to story {}", contribution.id, story_id);

            let _ = this.fetch_for_story(story_id).await;
            Ok(contribution)
        })
        .await
    }
}

async fn load_recent<B: Backend>(backend: &B, limit: usize) -> Result<Vec<ContributionWithDetails>, ClientError> {
    let query = Query::from(Table::Contributions)
        .order("created_at", false)
        .limit(limit);
    let contributions: Vec<Contribution> = decode_rows("Contribution", backend.select(&query).await?)?;
    if contributions.is_empty() {
        return Ok(Vec::new());
    }

    let story_ids: BTreeSet<i64> = contributions.iter().map(|c| c.story_id).collect();
    let user_ids: BTreeSet<Uuid> = contributions.iter().map(|c| c.user_id).collect();

    let stories: Vec<Story> = decode_rows(
        "Story",
        backend
            .select(&Query::from(Table::Stories).in_list("id", story_ids))
            .await?,
    )?;
    let profiles: Vec<Profile> = decode_rows(
        "Profile",
        backend
            .select(&Query::from(Table::Profiles).in_list("id", user_ids.iter().map(Uuid::to_string)))
            .await?,
    )?;

    let titles: HashMap<i64, String> = stories.into_iter().map(|s| (s.id, s.title)).collect();
    let usernames: HashMap<Uuid, String> = profiles.into_iter().map(|p| (p.id, p.username)).collect();

    Ok(contributions
        .into_iter()
        .map(|c| ContributionWithDetails {
            story_title: titles
                .get(&c.story_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_STORY.to_string()),
            username: usernames
                .get(&c.user_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            id: c.id,
            story_id: c.story_id,
            user_id: c.user_id,
            sentence: c.sentence,
            created_at: c.created_at,
        })
        .collect())
}
