//! Query model evaluated against a collection's documents.

use serde_json::Value;
use std::cmp::Ordering;

use super::Document;

/// Sort direction for an ordered query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single filter clause
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value
    Equal { field: String, value: Value },
    /// Array field contains the value
    ArrayContains { field: String, value: Value },
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Equal { field, value } => doc.get(field) == Some(value),
            Filter::ArrayContains { field, value } => doc
                .get(field)
                .and_then(Value::as_array)
                .map_or(false, |items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Query over the direct documents of one collection path
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equal {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_path(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and truncate a collection's documents.
    ///
    /// Without an explicit ordering, documents come back by id. Ties on the
    /// ordering field are broken by id so results are deterministic.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        match &self.order_by {
            Some(order) => matched.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.field), b.get(&order.field));
                let ord = match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            }),
            None => matched.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over field values: missing < null-like < bool < number <
/// string < array < object, then by value within a type.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new(id, fields),
            _ => panic!("expected object"),
        }
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_equality_and_array_contains() {
        let docs = vec![
            doc("c1", json!({ "participants": ["ana", "bob"], "open": true })),
            doc("c2", json!({ "participants": ["bob", "cam"], "open": true })),
            doc("c3", json!({ "participants": ["ana"], "open": false })),
        ];

        let query = Query::collection("individual_chats")
            .where_array_contains("participants", "ana")
            .where_eq("open", true);

        assert_eq!(ids(&query.apply(docs)), vec!["c1"]);
    }

    #[test]
    fn test_ordering_and_limit() {
        let docs = vec![
            doc("a", json!({ "timestamp": 30 })),
            doc("b", json!({ "timestamp": 10 })),
            doc("c", json!({ "timestamp": 20 })),
            doc("d", json!({})),
        ];

        let asc = Query::collection("x").order_by("timestamp", Direction::Ascending);
        assert_eq!(ids(&asc.apply(docs.clone())), vec!["d", "b", "c", "a"]);

        let desc = Query::collection("x")
            .order_by("timestamp", Direction::Descending)
            .limit(2);
        assert_eq!(ids(&desc.apply(docs)), vec!["a", "c"]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let docs = vec![
            doc("m2", json!({ "timestamp": 5 })),
            doc("m1", json!({ "timestamp": 5 })),
        ];

        let query = Query::collection("x").order_by("timestamp", Direction::Descending);
        assert_eq!(ids(&query.apply(docs)), vec!["m1", "m2"]);
    }

    #[test]
    fn test_compare_values_mixed_types() {
        assert_eq!(compare_values(None, Some(&json!(false))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(2))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(10)), Some(&json!("1"))), Ordering::Less);
    }
}
