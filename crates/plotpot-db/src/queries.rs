use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, ffi, params_from_iter};
use serde_json::{Map, Value};
use uuid::Uuid;

use plotpot_types::{BackendError, Filter, Query, Table};

use crate::convert::{format_timestamp, from_sql, to_sql};
use crate::models::UserRow;
use crate::schema::{Column, TableSchema, schema};

// -- Entity tables --

pub fn select_rows(conn: &Connection, query: &Query) -> Result<Vec<Value>, BackendError> {
    let schema = schema(query.table);
    if has_empty_in(&query.filters) {
        return Ok(vec![]);
    }

    let mut params = Vec::new();
    let conditions = conditions(schema, &query.filters, &mut params)?;

    let mut sql = format!("SELECT {} FROM {}", schema.column_list(), schema.table.name());
    push_where(&mut sql, &conditions);

    match &query.order {
        Some(order) => {
            let column = known_column(schema, &order.column)?;
            let direction = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY {} {}, rowid ASC", column.name, direction));
        }
        None => sql.push_str(" ORDER BY rowid ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    query_rows(conn, schema, &sql, params)
}

/// Insert one row on behalf of `actor`. Fills `created_at` when the table has
/// one and the row does not, and returns the stored row.
pub fn insert_row(
    conn: &Connection,
    table: Table,
    row: Value,
    actor: Option<Uuid>,
) -> Result<Value, BackendError> {
    let schema = schema(table);
    let actor = require_actor(actor, table)?;

    let Value::Object(mut fields) = row else {
        return Err(BackendError::Other(format!("insert into {} expects a JSON object", table)));
    };

    if schema.generated_id && fields.get("id").is_some_and(|id| !id.is_null()) {
        return Err(BackendError::Other(format!(
            "cannot insert a non-default value into column \"id\" of {}",
            table
        )));
    }

    if schema.has_created_at() && !fields.contains_key("created_at") {
        fields.insert("created_at".into(), Value::String(format_timestamp(Utc::now())));
    }

    if let Some(owner) = schema.owner {
        let matches_actor = fields
            .get(owner)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Uuid>().ok())
            == Some(actor);
        if !matches_actor {
            return Err(rls_violation(table));
        }
    }

    let mut columns = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len());
    for (name, value) in &fields {
        let column = known_column(schema, name)?;
        columns.push(column.name);
        params.push(to_sql(column, value)?);
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(params)).map_err(sql_error)?;

    let rowid = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM {} WHERE rowid = ?", schema.column_list(), table.name());
    query_rows(conn, schema, &sql, vec![SqlValue::Integer(rowid)])?
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Server(format!("inserted row missing from {}", table)))
}

/// Apply `changes` to the rows matching `filters` that `actor` owns.
/// Rows owned by someone else are silently left out, like a row-level policy.
pub fn update_rows(
    conn: &Connection,
    table: Table,
    filters: &[Filter],
    changes: Value,
    actor: Option<Uuid>,
) -> Result<Vec<Value>, BackendError> {
    let schema = schema(table);
    let actor = require_actor(actor, table)?;

    let Some(owner) = schema.owner else {
        return Err(BackendError::Forbidden(format!("{} is read-only for clients", table)));
    };

    let Value::Object(fields) = changes else {
        return Err(BackendError::Other(format!("update of {} expects a JSON object", table)));
    };
    if fields.is_empty() {
        return Err(BackendError::Other(format!("update of {} has no columns", table)));
    }
    if fields.contains_key("id") || fields.contains_key(owner) {
        return Err(rls_violation(table));
    }

    if has_empty_in(filters) {
        return Ok(vec![]);
    }

    let mut params = Vec::new();
    let mut conditions = conditions(schema, filters, &mut params)?;
    conditions.push(format!("{} = ?", owner));
    params.push(SqlValue::Text(actor.to_string()));

    let mut sql = format!("SELECT rowid FROM {}", table.name());
    push_where(&mut sql, &conditions);
    let rowids: Vec<i64> = {
        let mut stmt = conn.prepare(&sql).map_err(sql_error)?;
        stmt.query_map(params_from_iter(params), |row| row.get::<_, i64>(0))
            .map_err(sql_error)?
            .collect::<Result<_, _>>()
            .map_err(sql_error)?
    };
    if rowids.is_empty() {
        return Ok(vec![]);
    }

    let mut assignments = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len() + rowids.len());
    for (name, value) in &fields {
        let column = known_column(schema, name)?;
        assignments.push(format!("{} = ?", column.name));
        params.push(to_sql(column, value)?);
    }
    let id_params = vec!["?"; rowids.len()].join(", ");
    params.extend(rowids.iter().map(|id| SqlValue::Integer(*id)));

    let sql = format!(
        "UPDATE {} SET {} WHERE rowid IN ({})",
        table.name(),
        assignments.join(", "),
        id_params
    );
    conn.execute(&sql, params_from_iter(params)).map_err(sql_error)?;

    let sql = format!(
        "SELECT {} FROM {} WHERE rowid IN ({}) ORDER BY rowid ASC",
        schema.column_list(),
        table.name(),
        id_params
    );
    query_rows(conn, schema, &sql, rowids.into_iter().map(SqlValue::Integer).collect())
}

// -- Users --

pub fn create_user(conn: &Connection, id: Uuid, email: &str, password_hash: &str) -> Result<(), BackendError> {
    conn.execute(
        "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        (id.to_string(), email, password_hash, format_timestamp(Utc::now())),
    )
    .map_err(sql_error)?;
    Ok(())
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, BackendError> {
    conn.query_row(
        "SELECT id, email, password FROM users WHERE email = ?1",
        [email],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(sql_error)
}

// -- Helpers --

fn query_rows(
    conn: &Connection,
    schema: &TableSchema,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<Value>, BackendError> {
    let mut stmt = conn.prepare(sql).map_err(sql_error)?;
    let mut rows = stmt.query(params_from_iter(params)).map_err(sql_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql_error)? {
        let mut object = Map::with_capacity(schema.columns.len());
        for (idx, column) in schema.columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(sql_error)?;
            object.insert(column.name.to_string(), from_sql(column, value)?);
        }
        out.push(Value::Object(object));
    }
    Ok(out)
}

fn conditions(
    schema: &TableSchema,
    filters: &[Filter],
    params: &mut Vec<SqlValue>,
) -> Result<Vec<String>, BackendError> {
    filters
        .iter()
        .map(|filter| {
            let column = known_column(schema, filter.column())?;
            match filter {
                Filter::Eq(_, value) => {
                    params.push(to_sql(column, value)?);
                    Ok(format!("{} = ?", column.name))
                }
                Filter::In(_, values) => {
                    for value in values {
                        params.push(to_sql(column, value)?);
                    }
                    Ok(format!("{} IN ({})", column.name, vec!["?"; values.len()].join(", ")))
                }
            }
        })
        .collect()
}

fn push_where(sql: &mut String, conditions: &[String]) {
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
}

fn has_empty_in(filters: &[Filter]) -> bool {
    filters
        .iter()
        .any(|f| matches!(f, Filter::In(_, values) if values.is_empty()))
}

fn known_column(schema: &TableSchema, name: &str) -> Result<&'static Column, BackendError> {
    schema.column(name).ok_or_else(|| {
        BackendError::Other(format!(
            "column {}.{} does not exist",
            schema.table.name(),
            name
        ))
    })
}

fn require_actor(actor: Option<Uuid>, table: Table) -> Result<Uuid, BackendError> {
    actor.ok_or_else(|| BackendError::Unauthenticated(format!("sign in to write to {}", table)))
}

fn rls_violation(table: Table) -> BackendError {
    BackendError::Forbidden(format!(
        "new row violates row-level security policy for table \"{}\"",
        table
    ))
}

fn sql_error(e: rusqlite::Error) -> BackendError {
    if let rusqlite::Error::SqliteFailure(err, message) = &e {
        let detail = message.clone().unwrap_or_else(|| e.to_string());
        match err.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE
            | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            | ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return BackendError::Conflict(detail),
            ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
                return BackendError::Other(format!("violates check constraint: {}", detail));
            }
            _ => {}
        }
    }
    BackendError::Server(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (Connection, Uuid) {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::migrations::run(&conn).unwrap();
        let user = Uuid::new_v4();
        create_user(&conn, user, "ink@plotpot.app", "hash").unwrap();
        (conn, user)
    }

    fn story(conn: &Connection, user: Uuid, title: &str, completed: bool) -> Value {
        insert_row(
            conn,
            Table::Stories,
            json!({
                "title": title,
                "description": null,
                "created_by": user,
                "is_completed": completed,
                "total_sentences": 5
            }),
            Some(user),
        )
        .unwrap()
    }

    #[test]
    fn insert_assigns_id_and_timestamp() {
        let (conn, user) = setup();
        let row = story(&conn, user, "Fog", false);

        assert_eq!(row["id"], json!(1));
        assert_eq!(row["is_completed"], json!(false));
        assert!(row["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn equality_filter_preserves_store_order() {
        let (conn, user) = setup();
        story(&conn, user, "A", false);
        story(&conn, user, "B", true);
        story(&conn, user, "C", false);

        let rows = select_rows(&conn, &Query::from(Table::Stories).eq("is_completed", false)).unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
        assert_eq!(titles, ["A", "C"]);
    }

    #[test]
    fn in_filter_and_limit() {
        let (conn, user) = setup();
        for title in ["A", "B", "C"] {
            story(&conn, user, title, false);
        }

        let rows = select_rows(
            &conn,
            &Query::from(Table::Stories).in_list("id", [1, 3]).order("id", false).limit(1),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], json!("C"));

        let none = select_rows(&conn, &Query::from(Table::Stories).in_list("id", Vec::<i64>::new())).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let (conn, _) = setup();
        let err = select_rows(&conn, &Query::from(Table::Stories).eq("title; DROP TABLE stories", 1)).unwrap_err();
        assert!(matches!(err, BackendError::Other(_)));
    }

    #[test]
    fn writes_need_a_matching_owner() {
        let (conn, user) = setup();
        let row = json!({ "title": "T", "created_by": user, "is_completed": false, "total_sentences": 1 });

        let anonymous = insert_row(&conn, Table::Stories, row.clone(), None).unwrap_err();
        assert!(matches!(anonymous, BackendError::Unauthenticated(_)));

        let stranger = insert_row(&conn, Table::Stories, row, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(stranger, BackendError::Forbidden(_)));
    }

    #[test]
    fn update_only_touches_owned_rows() {
        let (conn, user) = setup();
        story(&conn, user, "Mine", false);

        let filters = [Filter::Eq("id".into(), json!(1))];
        let untouched = update_rows(
            &conn,
            Table::Stories,
            &filters,
            json!({ "is_completed": true }),
            Some(Uuid::new_v4()),
        )
        .unwrap();
        assert!(untouched.is_empty());

        let updated = update_rows(&conn, Table::Stories, &filters, json!({ "is_completed": true }), Some(user)).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["is_completed"], json!(true));
    }

    #[test]
    fn store_assigns_ids() {
        let (conn, user) = setup();
        let err = insert_row(
            &conn,
            Table::Stories,
            json!({ "id": 99, "title": "Forged", "created_by": user, "total_sentences": 3 }),
            Some(user),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Other(ref msg) if msg.contains("\"id\"")));

        // Profiles are keyed by the account id, which the client supplies.
        let profile = insert_row(
            &conn,
            Table::Profiles,
            json!({ "id": user, "username": "ink" }),
            Some(user),
        )
        .unwrap();
        assert_eq!(profile["id"], json!(user.to_string()));
    }

    #[test]
    fn duplicate_vote_is_a_conflict() {
        let (conn, user) = setup();
        story(&conn, user, "Vote me", false);
        let vote = json!({ "story_id": 1, "user_id": user, "plot_twist_option": "dragon" });

        insert_row(&conn, Table::Votes, vote.clone(), Some(user)).unwrap();
        let err = insert_row(&conn, Table::Votes, vote, Some(user)).unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
    }

    #[test]
    fn overlong_sentence_violates_check() {
        let (conn, user) = setup();
        story(&conn, user, "Long", false);
        let err = insert_row(
            &conn,
            Table::Contributions,
            json!({ "story_id": 1, "user_id": user, "sentence": "x".repeat(281) }),
            Some(user),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Other(_)));
    }

    #[test]
    fn users_are_found_by_email() {
        let (conn, user) = setup();
        let row = get_user_by_email(&conn, "ink@plotpot.app").unwrap().unwrap();
        assert_eq!(row.id, user.to_string());
        assert!(get_user_by_email(&conn, "nobody@plotpot.app").unwrap().is_none());
    }
}
