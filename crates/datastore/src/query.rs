//! Filters and find options, and their translation to SQL over the stored JSON.
//!
//! Paths are dotted field names (`inspections.result`).  They are checked against [PATH_RE] and then inlined into the
//! SQL as JSON paths rather than bound, because SQLite only matches an expression index when the expression is
//! textually identical.
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use crate::errors::*;

lazy_static! {
    static ref PATH_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("Static regex should compile");
    static ref NAME_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Static regex should compile");
}

/// Column holding the document text in every collection table.
pub(crate) const DOC_COLUMN: &str = "doc";

pub(crate) fn check_collection_name(name: &str) -> Result<()> {
    if !NAME_RE.is_match(name) {
        return Err(Error::InvalidCollectionName(name.to_string()));
    }
    Ok(())
}

/// Convert `a.b` to `$.a.b`.
pub(crate) fn json_path(path: &str) -> Result<String> {
    if !PATH_RE.is_match(path) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(format!("$.{}", path))
}

/// `json_extract(doc, '$.path')` for a checked path.
pub(crate) fn extract_expr(column: &str, path: &str) -> Result<String> {
    Ok(format!("json_extract({}, '{}')", column, json_path(path)?))
}

fn to_sql_value(path: &str, value: &Value) -> Result<SqlValue> {
    let unsupported = || Error::UnsupportedFilterValue {
        path: path.to_string(),
        value: value.clone(),
    };

    match value {
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else {
                n.as_f64().map(SqlValue::Real).ok_or_else(unsupported)
            }
        }
        _ => Err(unsupported()),
    }
}

/// Convert a value read back from SQLite into JSON.
pub(crate) fn from_sql_value(value: ValueRef) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// An index on a field of the objects inside an array, kept as a side table with one row per document and distinct
/// field value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ElementIndex {
    pub array: String,
    pub field: String,
    /// Identifier of the side table, with columns `seq` and `value`.
    pub table: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Field equals the value.  Equality with `null` also matches missing fields.
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Some element of the array at `array` has `field` equal to `value`.
    ElementEq {
        array: String,
        field: String,
        value: Value,
    },
    /// Every filter matches.  Empty matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Eq(path.into(), value.into())
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Gt(path.into(), value.into())
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Gte(path.into(), value.into())
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Lt(path.into(), value.into())
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::Lte(path.into(), value.into())
    }

    pub fn element_eq(
        array: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Filter {
        Filter::ElementEq {
            array: array.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Render as a SQL boolean expression, pushing bound parameters in order.
    ///
    /// Element filters covered by one of `elements` look the value up in its side table instead of walking every
    /// document's array.
    pub(crate) fn to_sql(&self, params: &mut Vec<SqlValue>, elements: &[ElementIndex]) -> Result<String> {
        match self {
            Filter::Eq(path, value) if value.is_null() => {
                Ok(format!("{} IS NULL", extract_expr(DOC_COLUMN, path)?))
            }
            Filter::Eq(path, value) => {
                params.push(to_sql_value(path, value)?);
                Ok(format!("{} = ?", extract_expr(DOC_COLUMN, path)?))
            }
            Filter::Gt(path, value) => range(path, ">", value, params),
            Filter::Gte(path, value) => range(path, ">=", value, params),
            Filter::Lt(path, value) => range(path, "<", value, params),
            Filter::Lte(path, value) => range(path, "<=", value, params),
            Filter::ElementEq {
                array,
                field,
                value,
            } => {
                let array_path = json_path(array)?;
                let field_path = json_path(field)?;
                params.push(to_sql_value(field, value)?);

                if let Some(index) = elements.iter().find(|i| &i.array == array && &i.field == field) {
                    return Ok(format!("seq IN (SELECT seq FROM {} WHERE value = ?)", index.table));
                }

                // The CASE keeps json_extract away from scalar elements, which aren't JSON text.
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({}, '{}') AS e WHERE \
                     CASE WHEN e.type = 'object' THEN json_extract(e.value, '{}') END = ?)",
                    DOC_COLUMN, array_path, field_path
                ))
            }
            Filter::And(filters) => {
                if filters.is_empty() {
                    return Ok("1".to_string());
                }

                let parts = filters
                    .iter()
                    .map(|f| f.to_sql(params, elements).map(|s| format!("({})", s)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" AND "))
            }
        }
    }
}

/// Ordering comparison, restricted to fields of the same kind as the value.  SQLite orders all text after all numbers,
/// which would otherwise make `rating > 4` match every string rating.
fn range(path: &str, op: &str, value: &Value, params: &mut Vec<SqlValue>) -> Result<String> {
    let kinds = match value {
        Value::Number(_) => "'integer', 'real'",
        Value::String(_) => "'text'",
        Value::Bool(_) => "'true', 'false'",
        _ => {
            return Err(Error::UnsupportedFilterValue {
                path: path.to_string(),
                value: value.clone(),
            })
        }
    };

    params.push(to_sql_value(path, value)?);
    Ok(format!(
        "json_type({}, '{}') IN ({}) AND {} {} ?",
        DOC_COLUMN,
        json_path(path)?,
        kinds,
        extract_expr(DOC_COLUMN, path)?,
        op
    ))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub path: String,
    pub order: SortOrder,
}

/// Options to [crate::Transaction::find].  Without a sort, documents come back in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn filtered(filter: Filter) -> FindOptions {
        FindOptions {
            filter: Some(filter),
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, path: impl Into<String>, order: SortOrder) -> FindOptions {
        self.sort = Some(Sort {
            path: path.into(),
            order,
        });
        self
    }

    pub fn limited(mut self, limit: usize) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    /// Build the select against `table`, returning the statement and its parameters.
    pub(crate) fn to_sql(&self, table: &str, elements: &[ElementIndex]) -> Result<(String, Vec<SqlValue>)> {
        let mut params = vec![];
        let mut clauses = vec![format!("SELECT {} FROM {}", DOC_COLUMN, table)];

        if let Some(f) = self.filter.as_ref() {
            clauses.push(format!("WHERE {}", f.to_sql(&mut params, elements)?));
        }

        let mut order = vec![];
        if let Some(s) = self.sort.as_ref() {
            let dir = match s.order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            order.push(format!("{} {}", extract_expr(DOC_COLUMN, &s.path)?, dir));
        }
        order.push("seq".to_string());
        clauses.push(format!("ORDER BY {}", order.iter().join(", ")));

        if let Some(l) = self.limit {
            clauses.push(format!("LIMIT {}", l));
        }

        Ok((clauses.join(" "), params))
    }
}
