use crate::error::AppError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::MySqlPool;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn to_sql_value(value: &Value) -> Result<SqlValue, AppError> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
                SqlValue::Time(t)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(AppError::bad_request("Unsupported number"));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(AppError::bad_request("Unsupported JSON value type")),
    })
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed_columns` may appear in the payload. Column
/// names are never taken from the request verbatim.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = allowed_columns
            .iter()
            .find(|c| **c == key.as_str())
            .ok_or_else(|| AppError::bad_request(format!("Field '{key}' cannot be updated")))?;

        columns.push(format!("{column} = ?"));
        values.push(to_sql_value(value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Binds a list of `SqlValue`s onto any sqlx query builder, in order
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::String(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::I64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::U64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::F64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Bool(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Time(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::DateTime(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}
pub(crate) use bind_values;

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let query = bind_values!(sqlx::query(&update.sql), update.values);

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["first_name", "hire_date", "salary", "status"];

    #[test]
    fn builds_set_clause_from_allowed_fields() {
        let update = build_update_sql(
            "employees",
            &json!({ "first_name": "Ana", "hire_date": "2025-02-01" }),
            COLUMNS,
            "id",
            7,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE employees SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("first_name = ?"));
        assert!(update.sql.contains("hire_date = ?"));
        assert_eq!(update.values.len(), 3);
        assert!(update.values.contains(&SqlValue::Date(
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
        )));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(7)));
    }

    #[test]
    fn rejects_columns_outside_allow_list() {
        let err = build_update_sql(
            "employees",
            &json!({ "id = 1; DROP TABLE employees; --": 1 }),
            COLUMNS,
            "id",
            1,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("employees", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("employees", &json!([1, 2]), COLUMNS, "id", 1).is_err());
        assert!(
            build_update_sql("employees", &json!({ "status": ["a"] }), COLUMNS, "id", 1).is_err()
        );
    }

    #[test]
    fn maps_json_scalars() {
        assert_eq!(to_sql_value(&json!(12)).unwrap(), SqlValue::I64(12));
        assert_eq!(to_sql_value(&json!(1.5)).unwrap(), SqlValue::F64(1.5));
        assert_eq!(to_sql_value(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)).unwrap(), SqlValue::Bool(true));
        assert_eq!(
            to_sql_value(&json!("active")).unwrap(),
            SqlValue::String("active".into())
        );
    }
}
