//! Column layout of each remote table as mirrored locally.
//!
//! Every identifier that ends up in generated SQL comes from these tables,
//! never from the request.

use plotpot_types::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
    /// Stored as 0/1
    Bool,
    /// RFC 3339 text, normalised to UTC with fixed precision so it sorts
    Timestamp,
    Uuid,
    /// Serialized JSON text
    Json,
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

#[derive(Debug)]
pub struct TableSchema {
    pub table: Table,
    pub columns: &'static [Column],
    /// Primary key assigned by the store on insert
    pub generated_id: bool,
    /// Column that must equal the session identity for writes
    pub owner: Option<&'static str>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_created_at(&self) -> bool {
        self.column("created_at").is_some()
    }

    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

use ColumnKind::*;

static STORIES: TableSchema = TableSchema {
    table: Table::Stories,
    columns: &[
        col("id", Integer),
        col("title", Text),
        col("description", Text),
        col("created_by", Uuid),
        col("created_at", Timestamp),
        col("is_completed", Bool),
        col("total_sentences", Integer),
    ],
    generated_id: true,
    owner: Some("created_by"),
};

static PROFILES: TableSchema = TableSchema {
    table: Table::Profiles,
    columns: &[
        col("id", Uuid),
        col("username", Text),
        col("avatar_url", Text),
        col("bio", Text),
    ],
    generated_id: false,
    owner: Some("id"),
};

static CONTRIBUTIONS: TableSchema = TableSchema {
    table: Table::Contributions,
    columns: &[
        col("id", Integer),
        col("story_id", Integer),
        col("user_id", Uuid),
        col("sentence", Text),
        col("created_at", Timestamp),
    ],
    generated_id: true,
    owner: Some("user_id"),
};

static VOTES: TableSchema = TableSchema {
    table: Table::Votes,
    columns: &[
        col("id", Integer),
        col("story_id", Integer),
        col("user_id", Uuid),
        col("plot_twist_option", Text),
        col("created_at", Timestamp),
    ],
    generated_id: true,
    owner: Some("user_id"),
};

static CHALLENGES: TableSchema = TableSchema {
    table: Table::Challenges,
    columns: &[
        col("id", Integer),
        col("title", Text),
        col("description", Text),
        col("start_date", Timestamp),
        col("end_date", Timestamp),
        col("is_active", Bool),
    ],
    generated_id: true,
    owner: None,
};

static ANIMATIONS: TableSchema = TableSchema {
    table: Table::Animations,
    columns: &[
        col("id", Integer),
        col("story_id", Integer),
        col("video_url", Text),
        col("created_at", Timestamp),
        col("metadata", Json),
    ],
    generated_id: true,
    owner: None,
};

pub fn schema(table: Table) -> &'static TableSchema {
    match table {
        Table::Stories => &STORIES,
        Table::Profiles => &PROFILES,
        Table::Contributions => &CONTRIBUTIONS,
        Table::Votes => &VOTES,
        Table::Challenges => &CHALLENGES,
        Table::Animations => &ANIMATIONS,
    }
}
