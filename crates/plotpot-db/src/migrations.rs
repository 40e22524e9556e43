use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Local DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY REFERENCES users(id),
                username    TEXT NOT NULL UNIQUE,
                avatar_url  TEXT,
                bio         TEXT CHECK (bio IS NULL OR length(bio) <= 500)
            );

            CREATE TABLE stories (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT CHECK (description IS NULL OR length(description) <= 1000),
                created_by      TEXT NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                is_completed    INTEGER NOT NULL DEFAULT 0,
                total_sentences INTEGER NOT NULL
            );

            CREATE INDEX idx_stories_completed ON stories(is_completed, created_at);

            CREATE TABLE contributions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL REFERENCES stories(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                sentence    TEXT NOT NULL CHECK (length(sentence) <= 280),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_contributions_story ON contributions(story_id, created_at);

            CREATE TABLE votes (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id            INTEGER NOT NULL REFERENCES stories(id),
                user_id             TEXT NOT NULL REFERENCES users(id),
                plot_twist_option   TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                UNIQUE(story_id, user_id)
            );

            CREATE TABLE challenges (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                description TEXT CHECK (description IS NULL OR length(description) <= 1000),
                start_date  TEXT NOT NULL,
                end_date    TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE animations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL REFERENCES stories(id),
                video_url   TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                metadata    TEXT
            );

            CREATE INDEX idx_animations_story ON animations(story_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Local DB migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
