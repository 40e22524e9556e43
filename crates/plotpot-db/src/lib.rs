//! Embedded SQLite implementation of the PlotPot backend.
//!
//! Mirrors the hosted store closely enough to develop offline and to act as
//! the collaborator in tests: same tables, server-assigned ids, password auth
//! with a bearer session, and owner checks on every write.

pub mod auth;
pub mod convert;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use plotpot_types::api::Identity;
use plotpot_types::{Backend, BackendError, Filter, Query, Table};

/// Local backend handle. Clones share the connection and the session.
#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    conn: Mutex<Connection>,
    jwt_secret: String,
    /// Bearer token of the signed-in identity
    session: Mutex<Option<String>>,
}

impl LocalInner {
    fn with_conn<F, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BackendError::Server(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl LocalBackend {
    pub fn open(path: &Path, jwt_secret: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let backend = Self::from_connection(conn, jwt_secret)?;
        info!("Local DB opened at {}", path.display());
        Ok(backend)
    }

    pub fn open_in_memory(jwt_secret: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, jwt_secret)
    }

    fn from_connection(conn: Connection, jwt_secret: &str) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            inner: Arc::new(LocalInner {
                conn: Mutex::new(conn),
                jwt_secret: jwt_secret.to_string(),
                session: Mutex::new(None),
            }),
        })
    }

    /// Bearer token of the current session, if any.
    pub fn session_token(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session(&self, token: Option<String>) {
        *self
            .inner
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    fn actor(&self) -> Option<Uuid> {
        self.current_identity().map(|identity| identity.id)
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.with_conn(f))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                BackendError::Server(format!("local store task failed: {}", e))
            })?
    }
}

impl Backend for LocalBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let query = query.clone();
        let rows = self.blocking(move |conn| queries::select_rows(conn, &query)).await?;
        debug!("Local select returned {} rows", rows.len());
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let actor = self.actor();
        self.blocking(move |conn| queries::insert_row(conn, table, row, actor))
            .await
    }

    async fn update(&self, table: Table, filters: &[Filter], changes: Value) -> Result<Vec<Value>, BackendError> {
        let actor = self.actor();
        let filters = filters.to_vec();
        self.blocking(move |conn| queries::update_rows(conn, table, &filters, changes, actor))
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let email = email.trim().to_lowercase();
        let password = password.to_string();
        let secret = self.inner.jwt_secret.clone();

        let (identity, token) = self
            .blocking(move |conn| {
                if queries::get_user_by_email(conn, &email)?.is_some() {
                    return Err(BackendError::Conflict("User already registered".into()));
                }

                let password_hash = auth::hash_password(&password)
                    .map_err(|e| BackendError::Server(e.to_string()))?;
                let user_id = Uuid::new_v4();
                queries::create_user(conn, user_id, &email, &password_hash)?;

                let token = auth::create_token(&secret, user_id, &email)
                    .map_err(|e| BackendError::Server(e.to_string()))?;

                Ok((
                    Identity {
                        id: user_id,
                        email: Some(email),
                    },
                    token,
                ))
            })
            .await?;

        self.set_session(Some(token));
        info!("Local user {} signed up", identity.id);
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        let email = email.trim().to_lowercase();
        let password = password.to_string();
        let secret = self.inner.jwt_secret.clone();

        let (identity, token) = self
            .blocking(move |conn| {
                let invalid = || BackendError::Unauthenticated("Invalid login credentials".into());

                let user = queries::get_user_by_email(conn, &email)?.ok_or_else(invalid)?;
                if !auth::verify_password(&password, &user.password) {
                    return Err(invalid());
                }

                let user_id: Uuid = user
                    .id
                    .parse()
                    .map_err(|_| BackendError::Server(format!("corrupt user id '{}'", user.id)))?;
                let token = auth::create_token(&secret, user_id, &user.email)
                    .map_err(|e| BackendError::Server(e.to_string()))?;

                Ok((
                    Identity {
                        id: user_id,
                        email: Some(user.email),
                    },
                    token,
                ))
            })
            .await?;

        self.set_session(Some(token));
        info!("Local user {} signed in", identity.id);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_session(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        let token = self.session_token()?;
        let identity = auth::identity_from_token(&self.inner.jwt_secret, &token);
        if identity.is_none() {
            debug!("Dropping expired local session");
            self.set_session(None);
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> LocalBackend {
        LocalBackend::open_in_memory("test-secret").unwrap()
    }

    #[tokio::test]
    async fn sign_up_starts_a_session() {
        let db = backend();
        assert!(db.current_identity().is_none());

        let identity = db.sign_up("Ink@PlotPot.app", "secret1").await.unwrap();
        assert_eq!(identity.email.as_deref(), Some("ink@plotpot.app"));
        assert_eq!(db.current_identity(), Some(identity));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = backend();
        db.sign_up("ink@plotpot.app", "secret1").await.unwrap();
        let err = db.sign_up("ink@plotpot.app", "secret2").await.unwrap_err();
        assert_eq!(err, BackendError::Conflict("User already registered".into()));
    }

    #[tokio::test]
    async fn sign_in_checks_the_password() {
        let db = backend();
        let created = db.sign_up("ink@plotpot.app", "secret1").await.unwrap();
        db.sign_out().await.unwrap();
        assert!(db.current_identity().is_none());

        let err = db.sign_in("ink@plotpot.app", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthenticated(_)));

        let identity = db.sign_in("ink@plotpot.app", "secret1").await.unwrap();
        assert_eq!(identity.id, created.id);
    }

    #[tokio::test]
    async fn insert_then_select_through_the_trait() {
        let db = backend();
        let me = db.sign_up("ink@plotpot.app", "secret1").await.unwrap();

        let row = db
            .insert(
                Table::Stories,
                json!({ "title": "Fog", "description": "D", "created_by": me.id, "is_completed": false, "total_sentences": 2 }),
            )
            .await
            .unwrap();
        assert_eq!(row["created_by"], json!(me.id.to_string()));

        let rows = db.select(&Query::from(Table::Stories).eq("id", row["id"].clone())).await.unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plotpot.db");

        {
            let db = LocalBackend::open(&path, "test-secret").unwrap();
            db.sign_up("ink@plotpot.app", "secret1").await.unwrap();
        }

        let db = LocalBackend::open(&path, "test-secret").unwrap();
        assert!(db.current_identity().is_none());
        db.sign_in("ink@plotpot.app", "secret1").await.unwrap();
    }
}
