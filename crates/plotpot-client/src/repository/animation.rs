use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use plotpot_types::models::{Animation, NewAnimation};
use plotpot_types::{Backend, Query, Table};

use crate::error::ClientError;
use crate::repository::{decode_row, detached, encode, preflight, settle};
use crate::session::SessionGate;
use crate::slot::Slot;
use crate::validation;

pub struct AnimationRepository<B> {
    inner: Arc<AnimationInner<B>>,
}

struct AnimationInner<B> {
    backend: Arc<B>,
    gate: SessionGate<B>,
    animation: Slot<Option<Animation>>,
    create_state: Slot<Animation>,
}

impl<B> Clone for AnimationRepository<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> AnimationRepository<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(AnimationInner {
                gate: SessionGate::new(Arc::clone(&backend)),
                backend,
                animation: Slot::new(),
                create_state: Slot::new(),
            }),
        }
    }

    pub fn animation(&self) -> Slot<Option<Animation>> {
        self.inner.animation.clone()
    }

    pub fn create_state(&self) -> Slot<Animation> {
        self.inner.create_state.clone()
    }

    /// The most recent animation of a story. A story that has none yet is
    /// `Success(None)`.
    pub async fn fetch_for_story(&self, story_id: i64) -> Result<Option<Animation>, ClientError> {
        let inner = Arc::clone(&self.inner);
        let ticket = inner.animation.begin();
        detached(async move {
            let result = load_latest(&*inner.backend, story_id).await;
            settle(&inner.animation, ticket, result)
        })
        .await
    }

    /// Attach a rendered video to a story. `metadata` is stored as given.
    pub async fn create_animation(
        &self,
        story_id: i64,
        video_url: &str,
        metadata: Option<Value>,
    ) -> Result<Animation, ClientError> {
        let slot = &self.inner.create_state;
        preflight(slot, validation::video_url(video_url))?;
        preflight(slot, self.inner.gate.require())?;

        let draft = NewAnimation {
            story_id,
            video_url: video_url.trim().to_string(),
            metadata,
        };

        let ticket = slot.begin();
        let this = self.clone();
        detached(async move {
            let result = async {
                let row = this
                    .inner
                    .backend
                    .insert(Table::Animations, encode("Animation", &draft)?)
                    .await?;
                decode_row::<Animation>("Animation", row)
            }
            .await;
            let animation = settle(&this.inner.create_state, ticket, result)?;
            info!("Created animation {} for story {}", animation.id, story_id);

            let _ = this.fetch_for_story(story_id).await;
            Ok(animation)
        })
        .await
    }
}

async fn load_latest<B: Backend>(backend: &B, story_id: i64) -> Result<Option<Animation>, ClientError> {
    let query = Query::from(Table::Animations)
        .eq("story_id", story_id)
        .order("created_at", false)
        .limit(1);
    let rows = backend.select(&query).await?;
    rows.into_iter()
        .next()
        .map(|row| decode_row("Animation", row))
        .transpose()
}
