//! Database row types for tables that never leave the backend.
//! Entity tables are exchanged as JSON rows instead, see `queries`.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
}
