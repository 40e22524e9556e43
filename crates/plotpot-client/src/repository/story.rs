use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use uuid::Uuid;

use plotpot_types::models::{NewStory, Story, StoryChanges};
use plotpot_types::{Backend, Filter, Query, Table, UiState};

use crate::cache::KeyedCache;
use crate::error::ClientError;
use crate::repository::{decode_rows, detached, encode, first_row, preflight, settle, to_state};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation::{self, ValidationError};

/// Equality filters for the story list. Unset fields match every story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoryFilter {
    pub completed: Option<bool>,
    pub created_by: Option<Uuid>,
}

impl StoryFilter {
    /// Stories still accepting contributions.
    pub fn open() -> Self {
        Self {
            completed: Some(false),
            created_by: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            completed: Some(true),
            created_by: None,
        }
    }

    pub fn created_by(mut self, user_id: Uuid) -> Self {
        self.created_by = Some(user_id);
        self
    }

    fn query(&self) -> Query {
        let mut query = Query::from(Table::Stories);
        if let Some(completed) = self.completed {
            query = query.eq("is_completed", completed);
        }
        if let Some(user_id) = self.created_by {
            query = query.eq("created_by", user_id.to_string());
        }
        query
    }
}

pub struct StoryRepository<B> {
    inner: Arc<StoryInner<B>>,
}

struct StoryInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    stories: Slot<Vec<Story>>,
    /// Filter of the most recent list fetch, reused when a write refreshes the list
    filter: Mutex<StoryFilter>,
    create_state: Slot<Story>,
    update_state: Slot<Story>,
    by_id: KeyedCache<i64, Story>,
}

impl<B> Clone for StoryRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> StoryRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(StoryInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                stories: Slot::new(),
                filter: Mutex::new(StoryFilter::open()),
                create_state: Slot::new(),
                update_state: Slot::new(),
                by_id: KeyedCache::new(),
            }),
        }
    }

    pub fn stories(&self) -> Slot<Vec<Story>> {
        self.inner.stories.clone()
    }

    pub fn create_state(&self) -> Slot<Story> {
        self.inner.create_state.clone()
    }

    pub fn update_state(&self) -> Slot<Story> {
        self.inner.update_state.clone()
    }

    fn last_filter(&self) -> StoryFilter {
        *self
            .inner
            .filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stories matching `filter`, in store order.
    pub async fn fetch_stories(&self, filter: StoryFilter) -> Result<Vec<Story>, ClientError> {
        *self
            .inner
            .filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = filter;

        let inner = Arc::clone(&self.inner);
        let ticket = inner.stories.begin();
        detached(async move {
            let result = load_stories(&*inner.backend, filter).await;
            if let Ok(stories) = &result {
                debug!("Fetched {} stories", stories.len());
            }
            settle(&inner.stories, ticket, result)
        })
        .await
    }

    /// Observable slot for one story. The first call per id fetches it; later
    /// calls return the same slot without another request.
    pub fn story(&self, id: i64) -> Slot<Story> {
        let backend = Arc::clone(&self.inner.backend);
        self.inner
            .by_id
            .get_or_fetch(id, move || async move { to_state(load_story(&*backend, id).await) })
    }

    /// Fetch the story again into its existing slot.
    pub fn refresh_story(&self, id: i64) -> Slot<Story> {
        let backend = Arc::clone(&self.inner.backend);
        self.inner
            .by_id
            .refresh(id, move || async move { to_state(load_story(&*backend, id).await) })
    }

    pub async fn create_story(
        &self,
        title: &str,
        description: Option<&str>,
        total_sentences: i32,
    ) -> Result<Story, ClientError> {
        let slot = &self.inner.create_state;
        preflight(slot, validate_draft(title, description, total_sentences))?;
        let identity = preflight(slot, self.inner.gate.require())?;

        let draft = NewStory {
            title: title.trim().to_string(),
            description: description.map(str::to_string),
            created_by: identity.id,
            is_completed: false,
            total_sentences,
        };

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = async {
                let row = this.inner.backend.insert(Table::Stories, encode("Story", &draft)?).await?;
                first_row::<Story>("Story", vec![row])
            }
            .await;
            let story = settle(&this.inner.create_state, ticket, result)?;
            info!("Created story {} ({:?})", story.id, story.title);

            // The list slot reports its own failure.
            let _ = this.fetch_stories(this.last_filter()).await;
            Ok(story)
        })
        .await
    }

    /// Apply `changes` to the story with `id`. Only its author's update
    /// matches a row; anyone else gets `NotFound`.
    pub async fn update_story(&self, id: i64, changes: StoryChanges) -> Result<Story, ClientError> {
        let slot = &self.inner.update_state;
        preflight(slot, validate_changes(&changes))?;
        preflight(slot, self.inner.gate.require())?;

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = async {
                let filters = [Filter::Eq("id".into(), id.into())];
                let rows = this
                    .inner
                    .backend
                    .update(Table::Stories, &filters, encode("Story", &changes)?)
                    .await?;
                first_row::<Story>("Story", rows)
            }
            .await;
            let story = settle(&this.inner.update_state, ticket, result)?;
            info!("Updated story {}", story.id);

            if let Some(cached) = this.inner.by_id.get(&id) {
                cached.set(UiState::Success(story.clone()));
            }
            let _ = this.fetch_stories(this.last_filter()).await;
            Ok(story)
        })
        .await
    }

    pub async fn complete_story(&self, id: i64) -> Result<Story, ClientError> {
        let changes = StoryChanges {
            is_completed: Some(true),
            ..StoryChanges::default()
        };
        self.update_story(id, changes).await
    }
}

async fn load_stories<B: Backend>(backend: &B, filter: StoryFilter) -> Result<Vec<Story>, ClientError> {
    let rows = backend.select(&filter.query()).await?;
    decode_rows("Story", rows)
}

async fn load_story<B: Backend>(backend: &B, id: i64) -> Result<Story, ClientError> {
    let rows = backend
        .select(&Query::from(Table::Stories).eq("id", id).limit(1))
        .await?;
    first_row("Story", rows)
}

fn validate_draft(title: &str, description: Option<&str>, total_sentences: i32) -> Result<(), ValidationError> {
    validation::title(title)?;
    validation::description(description)?;
    validation::total_sentences(total_sentences)
}

fn validate_changes(changes: &StoryChanges) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::NoChanges);
    }
    if let Some(title) = &changes.title {
        validation::title(title)?;
    }
    validation::description(changes.description.as_deref())?;
    if let Some(total) = changes.total_sentences {
        validation::total_sentences(total)?;
    }
    Ok(())
}
