use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use plotpot_types::models::{NewVote, Vote, VoteCount};
use plotpot_types::{Backend, BackendError, Filter, Query, Table};

use crate::error::ClientError;
use crate::repository::{decode_row, decode_rows, detached, encode, first_row, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation;

/// Plot-twist votes. Each user holds at most one vote per story; voting again
/// changes the chosen option.
pub struct VoteRepository<B> {
    inner: Arc<VoteInner<B>>,
}

struct VoteInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    votes: Slot<Vec<Vote>>,
    tally: Slot<Vec<VoteCount>>,
    cast_state: Slot<Vote>,
}

impl<B> Clone for VoteRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> VoteRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(VoteInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                votes: Slot::new(),
                tally: Slot::new(),
                cast_state: Slot::new(),
            }),
        }
    }

    pub fn votes(&self) -> Slot<Vec<Vote>> {
        self.inner.votes.clone()
    }

    pub fn tally_state(&self) -> Slot<Vec<VoteCount>> {
        self.inner.tally.clone()
    }

    pub fn cast_state(&self) -> Slot<Vote> {
        self.inner.cast_state.clone()
    }

    pub async fn fetch_for_story(&self, story_id: i64) -> Result<Vec<Vote>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.votes.begin();
        detached(async move {
            let result = load_votes(&*inner.backend, story_id).await;
            if let Ok(votes) = &result {
                debug!("Fetched {} votes for story {}", votes.len(), story_id);
            }
            settle(&inner.votes, ticket, result)
        })
        .await
    }

    /// Votes per option for one story, most popular first.
    pub async fn tally(&self, story_id: i64) -> Result<Vec<VoteCount>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.tally.begin();
        detached(async move {
            let result = load_votes(&*inner.backend, story_id)
                .await
                .map(|votes| count_votes(&votes));
            settle(&inner.tally, ticket, result)
        })
        .await
    }

    /// Record the signed-in user's choice for `story_id`, replacing any
    /// earlier choice.
    pub async fn cast_vote(&self, story_id: i64, option: &str) -> Result<Vote, ClientError> {
        let slot = &self.inner.cast_state;
        preflight(slot, validation::plot_twist_option(option))?;
        let identity = preflight(slot, self.inner.gate.require())?;

        let option = option.trim().to_string();

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = upsert(&*this.inner.backend, story_id, identity.id, &option).await;
            let vote = settle(&this.inner.cast_state, ticket, result)?;
            info!("User {} voted {:?} on story {}", identity.id, vote.plot_twist_option, story_id);

            let _ = this.fetch_for_story(story_id).await;
            Ok(vote)
        })
        .await
    }
}

async fn upsert<B: Backend>(backend: &B, story_id: i64, user_id: Uuid, option: &str) -> Result<Vote, ClientError> {
    let existing = backend
        .select(
            &Query::from(Table::Votes)
                .eq("story_id", story_id)
                .eq("user_id", user_id.to_string())
                .limit(1),
        )
        .await?;

    if let Some(row) = existing.into_iter().next() {
        let vote: Vote = decode_row("Vote", row)?;
        return change_option(backend, vote.id, option).await;
    }

    let draft = NewVote {
        story_id,
        user_id,
        plot_twist_option: option.to_string(),
    };
    match backend.insert(Table::Votes, encode("Vote", &draft)?).await {
        Ok(row) => decode_row("Vote", row),
        // Another session of the same user voted in between.
        Err(BackendError::Conflict(_)) => {
            let rows = backend
                .select(
                    &Query::from(Table::Votes)
                        .eq("story_id", story_id)
                        .eq("user_id", user_id.to_string()),
                )
                .await?;
            let vote: Vote = first_row("Vote", rows)?;
            change_option(backend, vote.id, option).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn change_option<B: Backend>(backend: &B, vote_id: i64, option: &str) -> Result<Vote, ClientError> {
    let filters = [Filter::Eq("id".into(), vote_id.into())];
    let rows = backend
        .update(Table::Votes, &filters, json!({ "plot_twist_option": option }))
        .await?;
    first_row("Vote", rows)
}

async fn load_votes<B: Backend>(backend: &B, story_id: i64) -> Result<Vec<Vote>, ClientError> {
    let query = Query::from(Table::Votes)
        .eq("story_id", story_id)
        .order("created_at", true);
    decode_rows("Vote", backend.select(&query).await?)
}

/// Count votes per option, ordered by count descending then option label.
pub fn count_votes(votes: &[Vote]) -> Vec<VoteCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.plot_twist_option.as_str()).or_default() += 1;
    }

    let mut tally: Vec<VoteCount> = counts
        .into_iter()
        .map(|(option, votes)| VoteCount {
            plot_twist_option: option.to_string(),
            votes,
        })
        .collect();
    tally.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then_with(|| a.plot_twist_option.cmp(&b.plot_twist_option))
    });
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn vote(id: i64, option: &str) -> Vote {
        Vote {
            id,
            story_id: 1,
            user_id: Uuid::new_v4(),
            plot_twist_option: option.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tally_orders_by_count_then_label() {
        let votes = [
            vote(1, "dragon"),
            vote(2, "betrayal"),
            vote(3, "dragon"),
            vote(4, "amnesia"),
        ];

        let tally = count_votes(&votes);
        let summary: Vec<(&str, usize)> = tally
            .iter()
            .map(|c| (c.plot_twist_option.as_str(), c.votes))
            .collect();
        assert_eq!(summary, vec![("dragon", 2), ("amnesia", 1), ("betrayal", 1)]);
    }

    #[test]
    fn empty_tally() {
        assert!(count_votes(&[]).is_empty());
    }
}
