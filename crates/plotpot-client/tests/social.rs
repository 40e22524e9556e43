mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::{PASSWORD, client, signed_in};
use plotpot_client::ClientError;
use plotpot_types::UiState;
use plotpot_types::models::{ProfileChanges, VoteCount};

#[tokio::test]
async fn contribution_round_trips_exactly() {
    let (app, _backend) = signed_in("quill").await;
    let story = app.stories.create_story("Fog", None, 4).await.unwrap();

    let sentence = "  The fog rolled in, carrying whispers, déjà vu and a single \"lantern\".";
    let added = app.contributions.add_contribution(story.id, sentence).await.unwrap();
    assert!(added.id > 0);
    assert_eq!(added.sentence, sentence);

    let fetched = app.contributions.fetch_for_story(story.id).await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].sentence, sentence);
    assert_eq!(fetched[0].id, added.id);
    assert_eq!(app.contributions.contributions().get(), UiState::Success(fetched));
}

#[tokio::test]
async fn longest_allowed_sentence_is_accepted() {
    let (app, backend) = signed_in("quill").await;
    let story = app.stories.create_story("Fog", None, 4).await.unwrap();

    let max = "w".repeat(280);
    app.contributions.add_contribution(story.id, &max).await.unwrap();

    let before = backend.total();
    app.contributions
        .add_contribution(story.id, &"w".repeat(281))
        .await
        .unwrap_err();
    assert_eq!(
        app.contributions.add_state().get(),
        UiState::Error("Sentence must be at most 280 characters".into())
    );
    assert_eq!(backend.total(), before);
}

#[tokio::test]
async fn contributing_needs_a_session() {
    let (app, backend) = client();

    let err = app.contributions.add_contribution(1, "Hello.").await.unwrap_err();
    assert_eq!(err, ClientError::NotSignedIn);
    assert_eq!(backend.inserts(), 0);
}

#[tokio::test]
async fn recent_feed_resolves_titles_and_authors() {
    let (app, _backend) = signed_in("quill").await;
    let fog = app.stories.create_story("Fog", None, 4).await.unwrap();
    let ash = app.stories.create_story("Ash", None, 4).await.unwrap();

    app.contributions.add_contribution(fog.id, "One.").await.unwrap();
    app.contributions.add_contribution(ash.id, "Two.").await.unwrap();
    app.contributions.add_contribution(fog.id, "Three.").await.unwrap();

    let recent = app.contributions.fetch_recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|c| c.username == "quill"));
    assert_eq!(recent[0].sentence, "Three.");
    assert_eq!(recent[0].story_title, "Fog");
    assert_eq!(recent[1].story_title, "Ash");
}

#[tokio::test]
async fn recent_feed_of_empty_store_skips_lookups() {
    let (app, backend) = client();

    assert!(app.contributions.fetch_recent(10).await.unwrap().is_empty());
    assert_eq!(backend.selects(), 1);
}

#[tokio::test]
async fn revoting_changes_the_option() {
    let (app, backend) = signed_in("quill").await;
    let story = app.stories.create_story("Fog", None, 4).await.unwrap();

    let first = app.votes.cast_vote(story.id, "dragon").await.unwrap();
    let updates = backend.updates();
    let second = app.votes.cast_vote(story.id, "betrayal").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.plot_twist_option, "betrayal");
    assert_eq!(backend.updates(), updates + 1);

    let votes = app.votes.fetch_for_story(story.id).await.unwrap();
    assert_eq!(votes.len(), 1);
}

#[tokio::test]
async fn tally_counts_each_voter_once() {
    let (app, _backend) = signed_in("quill").await;
    let story = app.stories.create_story("Fog", None, 4).await.unwrap();
    app.votes.cast_vote(story.id, "dragon").await.unwrap();

    app.auth.sign_out().await.unwrap();
    app.auth.sign_up("ember@plotpot.app", PASSWORD, "ember").await.unwrap();
    app.votes.cast_vote(story.id, "dragon").await.unwrap();

    app.auth.sign_out().await.unwrap();
    app.auth.sign_up("sable@plotpot.app", PASSWORD, "sable").await.unwrap();
    app.votes.cast_vote(story.id, "amnesia").await.unwrap();

    let tally = app.votes.tally(story.id).await.unwrap();
    assert_eq!(
        tally,
        vec![
            VoteCount { plot_twist_option: "dragon".into(), votes: 2 },
            VoteCount { plot_twist_option: "amnesia".into(), votes: 1 },
        ]
    );
    assert_eq!(app.votes.tally_state().get(), UiState::Success(tally));
}

#[tokio::test]
async fn blank_vote_is_rejected() {
    let (app, backend) = signed_in("quill").await;
    let before = backend.total();

    app.votes.cast_vote(1, " ").await.unwrap_err();
    assert_eq!(
        app.votes.cast_state().get(),
        UiState::Error("Plot twist option cannot be empty".into())
    );
    assert_eq!(backend.total(), before);
}

#[tokio::test]
async fn active_challenges_after_create() {
    let (app, _backend) = signed_in("quill").await;
    assert!(app.challenges.fetch_active().await.unwrap().is_empty());

    let start = Utc::now();
    let later = app
        .challenges
        .create_challenge("Haiku week", Some("Three lines only"), start + Duration::days(1), start + Duration::days(8))
        .await
        .unwrap();
    let sooner = app
        .challenges
        .create_challenge("Flash fiction", None, start, start + Duration::days(2))
        .await
        .unwrap();
    assert!(later.is_active);

    let active = app.challenges.challenges().get().into_success().unwrap();
    let ids: Vec<i64> = active.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![sooner.id, later.id]);

    app.challenges
        .create_challenge("Backwards", None, start, start - Duration::days(1))
        .await
        .unwrap_err();
    assert_eq!(
        app.challenges.create_state().get(),
        UiState::Error("Challenge must end after it starts".into())
    );
}

#[tokio::test]
async fn animation_is_optional_until_created() {
    let (app, _backend) = signed_in("quill").await;
    let story = app.stories.create_story("Fog", None, 4).await.unwrap();

    assert_eq!(app.animations.fetch_for_story(story.id).await.unwrap(), None);
    assert_eq!(app.animations.animation().get(), UiState::Success(None));

    let metadata = json!({ "duration_secs": 12, "style": "watercolor" });
    let created = app
        .animations
        .create_animation(story.id, "https://cdn.plotpot.app/fog.mp4", Some(metadata.clone()))
        .await
        .unwrap();
    assert_eq!(created.metadata, Some(metadata));

    let latest = app.animations.animation().get().into_success().unwrap();
    assert_eq!(latest.map(|a| a.id), Some(created.id));
}

#[tokio::test]
async fn profile_update_touches_own_row_only() {
    let (app, _backend) = signed_in("quill").await;
    let me = app.auth.current_user().await.unwrap().unwrap();

    let updated = app
        .profiles
        .update_profile(ProfileChanges {
            bio: Some("Writes about lighthouses.".into()),
            ..ProfileChanges::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.id, me.id);
    assert_eq!(updated.username, "quill");
    assert_eq!(updated.bio.as_deref(), Some("Writes about lighthouses."));
    assert_eq!(app.profiles.profile().get(), UiState::Success(Some(updated)));

    let err = app.profiles.update_profile(ProfileChanges::default()).await.unwrap_err();
    assert_eq!(err.user_message(), "Nothing to update");

    app.auth.sign_out().await.unwrap();
    let err = app
        .profiles
        .update_profile(ProfileChanges {
            username: Some("intruder".into()),
            ..ProfileChanges::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::NotSignedIn);
}

#[tokio::test]
async fn own_update_keeps_another_viewed_profile() {
    let (app, _backend) = signed_in("quill").await;
    let quill = app.auth.current_user().await.unwrap().unwrap();

    app.auth.sign_out().await.unwrap();
    app.auth.sign_up("ember@plotpot.app", PASSWORD, "ember").await.unwrap();

    let viewed = app.profiles.fetch_profile(quill.id).await.unwrap().unwrap();
    assert_eq!(viewed.username, "quill");

    let mine = app
        .profiles
        .update_profile(ProfileChanges {
            bio: Some("Collects matchboxes.".into()),
            ..ProfileChanges::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.username, "ember");
    assert_eq!(app.profiles.update_state().get(), UiState::Success(mine.clone()));
    assert_eq!(app.profiles.profile().get(), UiState::Success(Some(viewed)));

    // Once the signed-in user's own profile is on screen, updates show up.
    app.profiles.fetch_profile(mine.id).await.unwrap();
    let renamed = app
        .profiles
        .update_profile(ProfileChanges {
            username: Some("ember_writes".into()),
            ..ProfileChanges::default()
        })
        .await
        .unwrap();
    assert_eq!(app.profiles.profile().get(), UiState::Success(Some(renamed)));
}

#[tokio::test]
async fn unknown_profile_is_success_none() {
    let (app, _backend) = client();

    assert_eq!(app.profiles.fetch_profile(uuid::Uuid::new_v4()).await.unwrap(), None);
}
