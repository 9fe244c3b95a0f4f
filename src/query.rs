//! Filtered, ordered, cursor-paginated reads over a collection.

use std::cmp::Ordering;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::store::{Document, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
    ArrayContains,
    Matches,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Position of the last item on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub value: Value,
    pub id: String,
}

impl Cursor {
    /// Opaque token for passing a cursor through the command line.
    pub fn encode(&self) -> String {
        hex::encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = hex::decode(token.trim())
            .map_err(|_| LedgerError::invalid(format!("bad page token: {token}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| LedgerError::invalid(format!("bad page token: {token}")))
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
    pub total: usize,
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b) && !a.is_null()
}

fn equal_values(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal && type_rank(a) == type_rank(b)
}

/// A filter with its pattern compiled, ready to test documents.
struct Compiled<'a> {
    filter: &'a Filter,
    pattern: Option<Regex>,
}

impl<'a> Compiled<'a> {
    fn new(filter: &'a Filter) -> Result<Self> {
        let pattern = match filter.op {
            Op::Matches => {
                let text = filter
                    .value
                    .as_str()
                    .ok_or_else(|| LedgerError::invalid("`matches` filter needs a string pattern"))?;
                let re = Regex::new(text).map_err(|e| LedgerError::invalid(format!("bad pattern {text}: {e}")))?;
                Some(re)
            }
            Op::In if !filter.value.is_array() => {
                return Err(LedgerError::invalid("`in` filter needs an array value"));
            }
            _ => None,
        };
        Ok(Self { filter, pattern })
    }
}

fn matches_filter(doc: &Document, compiled: &Compiled) -> bool {
    let filter = compiled.filter;
    let actual = doc.field(&filter.field).unwrap_or(&Value::Null);
    let wanted = &filter.value;
    match filter.op {
        Op::Eq => equal_values(actual, wanted),
        Op::Ne => !equal_values(actual, wanted),
        Op::Lt => same_kind(actual, wanted) && compare_values(actual, wanted) == Ordering::Less,
        Op::Le => same_kind(actual, wanted) && compare_values(actual, wanted) != Ordering::Greater,
        Op::Gt => same_kind(actual, wanted) && compare_values(actual, wanted) == Ordering::Greater,
        Op::Ge => same_kind(actual, wanted) && compare_values(actual, wanted) != Ordering::Less,
        Op::In => match wanted {
            Value::Array(options) => options.iter().any(|o| equal_values(o, actual)),
            _ => false,
        },
        Op::Contains => match (actual, wanted) {
            (Value::String(hay), Value::String(needle)) => {
                hay.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        },
        Op::ArrayContains => match actual {
            Value::Array(items) => items.iter().any(|i| i == wanted),
            _ => false,
        },
        Op::Matches => match (&compiled.pattern, actual.as_str()) {
            (Some(re), Some(s)) => re.is_match(s),
            _ => false,
        },
    }
}

fn sort_key<'a>(doc: &'a Document, order: &Option<(String, Direction)>) -> &'a Value {
    match order {
        Some((field, _)) => doc.field(field).unwrap_or(&Value::Null),
        None => &Value::Null,
    }
}

fn compare_position(
    value_a: &Value,
    id_a: &str,
    value_b: &Value,
    id_b: &str,
    direction: Direction,
) -> Ordering {
    let by_value = compare_values(value_a, value_b);
    let by_value = match direction {
        Direction::Asc => by_value,
        Direction::Desc => by_value.reverse(),
    };
    by_value.then_with(|| id_a.cmp(id_b))
}

/// Filtered and sorted documents, before any limit.
fn matching(store: &dyn DocumentStore, query: &Query) -> Result<Vec<Document>> {
    let filters = query.filters.iter().map(Compiled::new).collect::<Result<Vec<_>>>()?;
    let mut docs: Vec<Document> = store
        .list(&query.collection)?
        .into_iter()
        .filter(|doc| filters.iter().all(|f| matches_filter(doc, f)))
        .collect();
    let direction = query.order_by.as_ref().map(|(_, d)| *d).unwrap_or(Direction::Asc);
    docs.sort_by(|a, b| {
        compare_position(
            sort_key(a, &query.order_by),
            &a.id,
            sort_key(b, &query.order_by),
            &b.id,
            direction,
        )
    });
    Ok(docs)
}

pub fn run(store: &dyn DocumentStore, query: &Query) -> Result<Vec<Document>> {
    let mut docs = matching(store, query)?;
    if let Some(n) = query.limit {
        docs.truncate(n);
    }
    Ok(docs)
}

/// One page of results starting strictly after `cursor`.
pub fn paginate(
    store: &dyn DocumentStore,
    query: &Query,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<Document>> {
    if page_size == 0 {
        return Err(LedgerError::invalid("page size must be at least 1"));
    }
    let docs = matching(store, query)?;
    let total = docs.len();
    let direction = query.order_by.as_ref().map(|(_, d)| *d).unwrap_or(Direction::Asc);

    let start = match cursor {
        Some(c) => docs
            .iter()
            .position(|d| {
                compare_position(sort_key(d, &query.order_by), &d.id, &c.value, &c.id, direction)
                    == Ordering::Greater
            })
            .unwrap_or(total),
        None => 0,
    };

    let end = (start + page_size).min(total);
    let items: Vec<Document> = docs[start..end].to_vec();
    let next = if end < total {
        items.last().map(|d| Cursor {
            value: sort_key(d, &query.order_by).clone(),
            id: d.id.clone(),
        })
    } else {
        None
    };

    Ok(Page { items, next, total })
}

pub fn run_as<T: DeserializeOwned>(store: &dyn DocumentStore, query: &Query) -> Result<Vec<T>> {
    run(store, query)?
        .into_iter()
        .map(|d| -> Result<T> { Ok(serde_json::from_value(d.data)?) })
        .collect()
}

pub fn paginate_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    query: &Query,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<Page<T>> {
    let page = paginate(store, query, page_size, cursor)?;
    let items = page
        .items
        .into_iter()
        .map(|d| serde_json::from_value(d.data))
        .collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(Page {
        items,
        next: page.next,
        total: page.total,
    })
}
