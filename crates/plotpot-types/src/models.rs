use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// -- Stories --

/// A story as stored remotely. The id is assigned by the store on insert;
/// a story that has not been created yet is a [`NewStory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_completed: bool,
    pub total_sentences: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStory {
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub is_completed: bool,
    pub total_sentences: i32,
}

/// Partial update of a story. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sentences: Option<i32>,
}

impl StoryChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.is_completed.is_none()
            && self.total_sentences.is_none()
    }
}

// -- Profiles --

/// Public profile of a user. Shares its id with the authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Profile row written right after sign-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar_url.is_none() && self.bio.is_none()
    }
}

// -- Contributions --

/// One sentence added to a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: i64,
    pub story_id: i64,
    pub user_id: Uuid,
    pub sentence: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContribution {
    pub story_id: i64,
    pub user_id: Uuid,
    pub sentence: String,
}

/// A contribution joined with the title of its story and the author's username,
/// as shown in the recent activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionWithDetails {
    pub id: i64,
    pub story_id: i64,
    pub user_id: Uuid,
    pub sentence: String,
    pub created_at: DateTime<Utc>,
    pub story_title: String,
    pub username: String,
}

// -- Votes --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub story_id: i64,
    pub user_id: Uuid,
    pub plot_twist_option: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVote {
    pub story_id: i64,
    pub user_id: Uuid,
    pub plot_twist_option: String,
}

/// Number of votes cast for one plot twist option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub plot_twist_option: String,
    pub votes: usize,
}

// -- Challenges --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChallenge {
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

// -- Animations --

/// Generated video for a story. `metadata` is opaque to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub id: i64,
    pub story_id: i64,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnimation {
    pub story_id: i64,
    pub video_url: String,
    pub metadata: Option<Value>,
}
