//! Typed data access for PlotPot with observable UI state.
//!
//! Repositories translate typed requests into backend queries and publish
//! every outcome into [`Slot`]s the UI observes. The backend is injected, so
//! the same repositories run against the hosted service or a local store.

pub mod cache;
pub mod config;
pub mod error;
pub mod repository;
pub mod session;
pub mod slot;
pub mod validation;

use std::sync::Arc;

use plotpot_types::Backend;

pub use cache::KeyedCache;
pub use config::{BackendKind, ClientConfig, ConfigError, RestConfig};
pub use error::{ClientError, ErrorKind, classify_message};
pub use repository::{
    AnimationRepository, AuthRepository, ChallengeRepository, ContributionRepository, ProfileRepository,
    StoryFilter, StoryRepository, VoteRepository,
};
pub use session::SessionGate;
pub use slot::{Slot, Ticket};
pub use validation::ValidationError;

/// Every repository wired to one shared backend handle.
pub struct PlotPot<B> {
    backend: Arc<B>,
    pub auth: AuthRepository<B>,
    pub stories: StoryRepository<B>,
    pub profiles: ProfileRepository<B>,
    pub contributions: ContributionRepository<B>,
    pub votes: VoteRepository<B>,
    pub challenges: ChallengeRepository<B>,
    pub animations: AnimationRepository<B>,
}

impl<B> Clone for PlotPot<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            auth: self.auth.clone(),
            stories: self.stories.clone(),
            profiles: self.profiles.clone(),
            contributions: self.contributions.clone(),
            votes: self.votes.clone(),
            challenges: self.challenges.clone(),
            animations: self.animations.clone(),
        }
    }
}

impl<B: Backend> PlotPot<B> {
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            auth: AuthRepository::new(Arc::clone(&backend)),
            stories: StoryRepository::new(Arc::clone(&backend)),
            profiles: ProfileRepository::new(Arc::clone(&backend)),
            contributions: ContributionRepository::new(Arc::clone(&backend)),
            votes: VoteRepository::new(Arc::clone(&backend)),
            challenges: ChallengeRepository::new(Arc::clone(&backend)),
            animations: AnimationRepository::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}
