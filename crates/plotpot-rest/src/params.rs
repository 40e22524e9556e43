//! PostgREST query-string encoding of a [`Query`].

use serde_json::Value;

use plotpot_types::{Filter, Query};

/// Query-string pairs for a select. `select=*` always comes first.
pub fn select_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));

    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

pub fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq(column, Value::Null) => (column.clone(), "is.null".to_string()),
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", literal(value))),
            Filter::In(column, values) => {
                let list = values.iter().map(list_item).collect::<Vec<_>>().join(",");
                (column.clone(), format!("in.({})", list))
            }
        })
        .collect()
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strings inside `in.(...)` are double-quoted so commas and parentheses survive.
fn list_item(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
