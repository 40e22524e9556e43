pub mod api;
pub mod backend;
pub mod models;
pub mod state;

pub use backend::{Backend, BackendError, Filter, Order, Query, Table};
pub use state::UiState;
