use anyhow::{Context, anyhow, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use plotpot_client::{ClientError, PlotPot, StoryFilter};
use plotpot_types::{Backend, UiState};

/// Credentials for commands that write. Local sessions end with the process,
/// so every such command signs in first.
#[derive(Args, Debug)]
pub struct Login {
    #[arg(long, env = "PLOTPOT_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "PLOTPOT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account and its profile
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        username: String,
    },

    /// Check credentials and print the signed-in user
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Print the signed-in user, if any
    Whoami {
        #[command(flatten)]
        login: Login,
    },

    /// List open stories, or completed ones with --completed
    Stories {
        #[arg(long)]
        completed: bool,
    },

    /// Show one story
    Story { id: i64 },

    CreateStory {
        #[command(flatten)]
        login: Login,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 10)]
        sentences: i32,
    },

    /// Mark one of your stories as completed
    CompleteStory {
        #[command(flatten)]
        login: Login,
        id: i64,
    },

    /// Add a sentence to a story
    Contribute {
        #[command(flatten)]
        login: Login,
        story: i64,
        sentence: String,
    },

    /// Sentences of a story, oldest first
    Contributions { story: i64 },

    /// Latest sentences across all stories
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Vote for a plot twist; voting again changes your choice
    Vote {
        #[command(flatten)]
        login: Login,
        story: i64,
        option: String,
    },

    /// Vote counts for a story
    Votes { story: i64 },

    /// Currently active challenges
    Challenges,

    /// Latest animation of a story
    Animation { story: i64 },

    /// Public profile of a user
    Profile { user: Uuid },
}

pub async fn run<B: Backend>(app: PlotPot<B>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Signup {
            email,
            password,
            username,
        } => print_json(&report(app.auth.sign_up(&email, &password, &username).await)?),

        Command::Signin { email, password } => print_json(&report(app.auth.sign_in(&email, &password).await)?),

        Command::Whoami { login } => {
            if login.email.is_some() {
                sign_in(&app, &login).await?;
            }
            match report(app.auth.current_user().await)? {
                Some(user) => print_json(&user),
                None => {
                    println!("Not signed in");
                    Ok(())
                }
            }
        }

        Command::Stories { completed } => {
            let filter = if completed {
                StoryFilter::completed()
            } else {
                StoryFilter::open()
            };
            print_json(&report(app.stories.fetch_stories(filter).await)?)
        }

        Command::Story { id } => {
            let state = app.stories.story(id).settled().await;
            settled(state)
        }

        Command::CreateStory {
            login,
            title,
            description,
            sentences,
        } => {
            sign_in(&app, &login).await?;
            let story = app
                .stories
                .create_story(&title, description.as_deref(), sentences)
                .await;
            print_json(&report(story)?)
        }

        Command::CompleteStory { login, id } => {
            sign_in(&app, &login).await?;
            print_json(&report(app.stories.complete_story(id).await)?)
        }

        Command::Contribute { login, story, sentence } => {
            sign_in(&app, &login).await?;
            print_json(&report(app.contributions.add_contribution(story, &sentence).await)?)
        }

        Command::Contributions { story } => print_json(&report(app.contributions.fetch_for_story(story).await)?),

        Command::Recent { limit } => print_json(&report(app.contributions.fetch_recent(limit).await)?),

        Command::Vote { login, story, option } => {
            sign_in(&app, &login).await?;
            print_json(&report(app.votes.cast_vote(story, &option).await)?)
        }

        Command::Votes { story } => print_json(&report(app.votes.tally(story).await)?),

        Command::Challenges => print_json(&report(app.challenges.fetch_active().await)?),

        Command::Animation { story } => match report(app.animations.fetch_for_story(story).await)? {
            Some(animation) => print_json(&animation),
            None => {
                println!("No animation for story {} yet", story);
                Ok(())
            }
        },

        Command::Profile { user } => match report(app.profiles.fetch_profile(user).await)? {
            Some(profile) => print_json(&profile),
            None => bail!("No profile for user {}", user),
        },
    }
}

async fn sign_in<B: Backend>(app: &PlotPot<B>, login: &Login) -> anyhow::Result<()> {
    let email = login
        .email
        .as_deref()
        .context("--email (or PLOTPOT_EMAIL) is required")?;
    let password = login
        .password
        .as_deref()
        .context("--password (or PLOTPOT_PASSWORD) is required")?;

    let user = report(app.auth.sign_in(email, password).await)?;
    debug!("Acting as {} ({})", user.username, user.id);
    Ok(())
}

/// Surface the message the UI would show.
fn report<T>(result: Result<T, ClientError>) -> anyhow::Result<T> {
    result.map_err(|e| anyhow!(e.user_message()))
}

fn settled<T: Serialize>(state: UiState<T>) -> anyhow::Result<()> {
    match state {
        UiState::Success(value) => print_json(&value),
        UiState::Error(message) => bail!(message),
        UiState::Initial | UiState::Loading => bail!("operation did not finish"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
