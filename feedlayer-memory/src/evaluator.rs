//! Query evaluation for in-memory items.
//!
//! This module runs a parsed [`SelectStatement`] over stored JSON items: filtering, sorting,
//! offset/limit and projection. Expressions evaluate to `Option<Value>`, where `None` is the
//! dialect's *undefined*: a missing property, or a comparison between values of different
//! types. A filter keeps an item only when it evaluates to `true`.

use serde_json::{Map, Value};
use std::{cmp::Ordering, collections::HashMap};

use feedlayer_core::{
    error::{FeedError, FeedResult},
    query::{SortDirection, SqlQuery},
};

use crate::sql::{BinaryOp, Function, PathSegment, Projection, SelectStatement, SqlExpr, UnaryOp};

/// Type-erased, comparable view of a JSON value.
///
/// Numbers are normalized to `f64`. Only values of the same type order against each other.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => Comparable::Number(value.as_f64().unwrap_or(f64::NAN)),
            Value::String(value) => Comparable::String(value),
            Value::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of this value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Bool(_) => 2,
            Comparable::Number(_) => 3,
            Comparable::String(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Map(_) => 6,
        }
    }

    fn same_type(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Total order used by `ORDER BY`: undefined < null < bool < number < string < array < object.
pub(crate) fn sort_order(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => {
            let (left, right) = (Comparable::from(left), Comparable::from(right));
            left.rank()
                .cmp(&right.rank())
                .then_with(|| left.partial_cmp(&right).unwrap_or(Ordering::Equal))
        }
    }
}

/// Evaluates expressions against one item, resolving `@parameters` from the query.
pub(crate) struct ItemEvaluator<'a> {
    item: &'a Value,
    query: &'a SqlQuery,
}

impl<'a> ItemEvaluator<'a> {
    pub fn new(item: &'a Value, query: &'a SqlQuery) -> Self {
        Self { item, query }
    }

    /// Returns `true` if `filter` evaluates to `true` for this item.
    pub fn matches(&self, filter: &SqlExpr) -> FeedResult<bool> {
        Ok(self.evaluate(filter)? == Some(Value::Bool(true)))
    }

    pub fn evaluate(&self, expr: &SqlExpr) -> FeedResult<Option<Value>> {
        match expr {
            SqlExpr::Literal(value) => Ok(Some(value.clone())),
            SqlExpr::Parameter(name) => self
                .query
                .parameter(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| FeedError::InvalidQuery(format!("parameter @{name} is not bound"))),
            SqlExpr::Path { segments, .. } => Ok(resolve_path(self.item, segments).cloned()),
            SqlExpr::Array(items) => Ok(Some(Value::Array(
                items
                    .iter()
                    .map(|item| self.evaluate(item))
                    .collect::<FeedResult<Vec<_>>>()?
                    .into_iter()
                    .flatten()
                    .collect(),
            ))),
            SqlExpr::BinaryOp { left, op, right } => self.binary(left, *op, right),
            SqlExpr::UnaryOp { op, expr } => Ok(match (op, self.evaluate(expr)?) {
                (UnaryOp::Not, Some(Value::Bool(b))) => Some(Value::Bool(!b)),
                (UnaryOp::Minus, Some(Value::Number(n))) => negate(&n),
                _ => None,
            }),
            SqlExpr::In { expr, list, negated } => {
                let Some(value) = self.evaluate(expr)? else {
                    return Ok(None);
                };

                let mut found = false;
                for candidate in list {
                    if let Some(candidate) = self.evaluate(candidate)? {
                        if Comparable::from(&candidate) == Comparable::from(&value) {
                            found = true;
                            break;
                        }
                    }
                }

                Ok(Some(Value::Bool(found != *negated)))
            }
            SqlExpr::Function { function, args } => self.function(*function, args),
        }
    }

    fn binary(&self, left: &SqlExpr, op: BinaryOp, right: &SqlExpr) -> FeedResult<Option<Value>> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        if let BinaryOp::And | BinaryOp::Or = op {
            let (l, r) = (as_bool(&left), as_bool(&right));
            return Ok(match op {
                BinaryOp::And => match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(Value::Bool(false)),
                    (Some(true), Some(true)) => Some(Value::Bool(true)),
                    _ => None,
                },
                _ => match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(Value::Bool(true)),
                    (Some(false), Some(false)) => Some(Value::Bool(false)),
                    _ => None,
                },
            });
        }

        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };
        let (left, right) = (Comparable::from(&left), Comparable::from(&right));
        if !left.same_type(&right) {
            return Ok(None);
        }

        let result = match op {
            BinaryOp::Eq => left == right,
            BinaryOp::NotEq => left != right,
            _ => match left.partial_cmp(&right) {
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => return Ok(None),
            },
        };

        Ok(Some(Value::Bool(result)))
    }

    fn function(&self, function: Function, args: &[SqlExpr]) -> FeedResult<Option<Value>> {
        let values = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<FeedResult<Vec<_>>>()?;
        let first = values.first().and_then(Option::as_ref);
        let second = values.get(1).and_then(Option::as_ref);
        let flag = values.get(2).and_then(Option::as_ref).and_then(Value::as_bool).unwrap_or(false);

        let is = |predicate: fn(&Value) -> bool| Some(Value::Bool(first.is_some_and(predicate)));

        Ok(match function {
            Function::IsDefined => Some(Value::Bool(first.is_some())),
            Function::IsNull => is(Value::is_null),
            Function::IsString => is(Value::is_string),
            Function::IsNumber => is(Value::is_number),
            Function::IsBool => is(Value::is_boolean),
            Function::IsArray => is(Value::is_array),
            Function::StartsWith | Function::EndsWith | Function::Contains => {
                match (first.and_then(Value::as_str), second.and_then(Value::as_str)) {
                    (Some(text), Some(pattern)) => {
                        let (text, pattern) = if flag {
                            (text.to_lowercase(), pattern.to_lowercase())
                        } else {
                            (text.to_string(), pattern.to_string())
                        };
                        Some(Value::Bool(match function {
                            Function::StartsWith => text.starts_with(&pattern),
                            Function::EndsWith => text.ends_with(&pattern),
                            _ => text.contains(&pattern),
                        }))
                    }
                    _ => None,
                }
            }
            Function::ArrayContains => match first.and_then(Value::as_array) {
                Some(array) => Some(Value::Bool(match second {
                    Some(needle) => array.iter().any(|element| array_element_matches(element, needle, flag)),
                    None => false,
                })),
                None => None,
            },
            Function::Lower => first.and_then(Value::as_str).map(|s| Value::String(s.to_lowercase())),
            Function::Upper => first.and_then(Value::as_str).map(|s| Value::String(s.to_uppercase())),
            Function::Length => first
                .and_then(Value::as_str)
                .map(|s| Value::from(s.chars().count() as u64)),
            Function::ArrayLength => first
                .and_then(Value::as_array)
                .map(|a| Value::from(a.len() as u64)),
        })
    }
}

fn as_bool(value: &Option<Value>) -> Option<bool> {
    value.as_ref().and_then(Value::as_bool)
}

fn negate(number: &serde_json::Number) -> Option<Value> {
    if let Some(i) = number.as_i64() {
        return i.checked_neg().map(Value::from);
    }
    number
        .as_f64()
        .and_then(|f| serde_json::Number::from_f64(-f))
        .map(Value::Number)
}

/// With `partial`, an object needle matches any element holding at least its properties.
fn array_element_matches(element: &Value, needle: &Value, partial: bool) -> bool {
    match (partial, element, needle) {
        (true, Value::Object(element), Value::Object(needle)) => needle
            .iter()
            .all(|(k, v)| element.get(k).is_some_and(|e| Comparable::from(e) == Comparable::from(v))),
        _ => Comparable::from(element) == Comparable::from(needle),
    }
}

pub(crate) fn resolve_path<'v>(item: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments.iter().try_fold(item, |current, segment| match segment {
        PathSegment::Field(field) => current.get(field.as_str()),
        PathSegment::Index(index) => current.get(*index),
    })
}

/// Runs `statement` over `items`, in storage order, returning the full result set.
///
/// # Errors
///
/// Returns [`FeedError::InvalidQuery`] for unbound parameters or a non-integer
/// `TOP`/`OFFSET`/`LIMIT`.
pub(crate) fn execute<'v>(
    statement: &SelectStatement,
    query: &SqlQuery,
    items: impl IntoIterator<Item = &'v Value>,
) -> FeedResult<Vec<Value>> {
    let mut matched = Vec::new();
    for item in items {
        let keep = match &statement.filter {
            Some(filter) => ItemEvaluator::new(item, query).matches(filter)?,
            None => true,
        };
        if keep {
            matched.push(item);
        }
    }

    if !statement.order_by.is_empty() {
        let mut keyed = matched
            .into_iter()
            .map(|item| {
                let evaluator = ItemEvaluator::new(item, query);
                let keys = statement
                    .order_by
                    .iter()
                    .map(|order| evaluator.evaluate(&order.expr))
                    .collect::<FeedResult<Vec<_>>>()?;
                Ok((keys, item))
            })
            .collect::<FeedResult<Vec<_>>>()?;

        keyed.sort_by(|(left, _), (right, _)| {
            statement
                .order_by
                .iter()
                .zip(left.iter().zip(right.iter()))
                .map(|(order, (l, r))| {
                    let ordering = sort_order(l.as_ref(), r.as_ref());
                    match order.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        matched = keyed.into_iter().map(|(_, item)| item).collect();
    }

    let constant = Value::Object(Map::new());
    let constant = ItemEvaluator::new(&constant, query);

    let mut window: Box<dyn Iterator<Item = &Value>> = Box::new(matched.into_iter());
    if let Some((offset, limit)) = &statement.offset_limit {
        let offset = count_argument(&constant, offset, "OFFSET")?;
        let limit = count_argument(&constant, limit, "LIMIT")?;
        window = Box::new(window.skip(offset).take(limit));
    }
    if let Some(top) = &statement.top {
        window = Box::new(window.take(count_argument(&constant, top, "TOP")?));
    }

    match &statement.projection {
        Projection::Star => Ok(window.cloned().collect()),
        Projection::Count { value } => {
            let count = Value::from(window.count() as u64);
            Ok(vec![if *value {
                count
            } else {
                let mut row = Map::new();
                row.insert("$1".to_string(), count);
                Value::Object(row)
            }])
        }
        Projection::Value(expr) => {
            let mut results = Vec::new();
            for item in window {
                if let Some(value) = ItemEvaluator::new(item, query).evaluate(expr)? {
                    results.push(value);
                }
            }
            Ok(results)
        }
    }
}

fn count_argument(evaluator: &ItemEvaluator<'_>, expr: &SqlExpr, clause: &str) -> FeedResult<usize> {
    evaluator
        .evaluate(expr)?
        .as_ref()
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| FeedError::InvalidQuery(format!("{clause} requires a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;
    use serde_json::json;

    fn items() -> Vec<Value> {
        vec![
            json!({ "id": "1", "name": "Ada", "age": 36, "tags": ["math", "code"], "address": { "city": "London" } }),
            json!({ "id": "2", "name": "Grace", "age": 85, "tags": ["navy"] }),
            json!({ "id": "3", "name": "alan", "age": "41", "address": { "city": "Wilmslow" } }),
            json!({ "id": "4", "name": null, "age": 29 }),
        ]
    }

    fn run(query: SqlQuery) -> Vec<Value> {
        let statement = parse(query.text()).unwrap();
        execute(&statement, &query, items().iter()).unwrap()
    }

    fn ids(results: &[Value]) -> Vec<&str> {
        results.iter().map(|v| v["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn comparisons_skip_mismatched_types() {
        let results = run(SqlQuery::new("SELECT * FROM c WHERE c.age > @min").with_parameter("min", 30));

        assert_eq!(ids(&results), vec!["1", "2"]);
    }

    #[test]
    fn undefined_properties_never_match() {
        let results = run(SqlQuery::new("SELECT * FROM c WHERE c.address.city != 'London'"));
        assert_eq!(ids(&results), vec!["3"]);

        let results = run(SqlQuery::new("SELECT * FROM c WHERE NOT IS_DEFINED(c.address)"));
        assert_eq!(ids(&results), vec!["2", "4"]);
    }

    #[test]
    fn string_and_array_functions() {
        let results = run(SqlQuery::new(
            "SELECT * FROM c WHERE STARTSWITH(c.name, 'a', true) OR ARRAY_CONTAINS(c.tags, 'navy')",
        ));
        assert_eq!(ids(&results), vec!["1", "2", "3"]);

        let results = run(
            SqlQuery::new("SELECT * FROM c WHERE ARRAY_CONTAINS(@ids, c.id) AND IS_STRING(c.name)")
                .with_parameter("ids", json!(["2", "4"])),
        );
        assert_eq!(ids(&results), vec!["2"]);
    }

    #[test]
    fn rendered_not_contains_matches_strings_and_arrays() {
        let query = feedlayer_core::query::Select::from(feedlayer_core::query::Filter::not_contains("tags", "math"))
            .to_sql()
            .unwrap();

        assert_eq!(ids(&run(query)), vec!["2", "3", "4"]);
    }

    #[test]
    fn orders_across_types_and_directions() {
        let results = run(SqlQuery::new("SELECT * FROM c ORDER BY c.age DESC"));
        assert_eq!(ids(&results), vec!["3", "2", "1", "4"]);

        let results = run(SqlQuery::new("SELECT * FROM c ORDER BY c.name"));
        assert_eq!(ids(&results), vec!["4", "1", "2", "3"]);
    }

    #[test]
    fn offset_limit_top_and_projections() {
        let results = run(
            SqlQuery::new("SELECT * FROM c ORDER BY c.id OFFSET @row LIMIT @size")
                .with_parameter("row", 1)
                .with_parameter("size", 2),
        );
        assert_eq!(ids(&results), vec!["2", "3"]);

        assert_eq!(run(SqlQuery::new("SELECT TOP 1 * FROM c")).len(), 1);
        assert_eq!(run(SqlQuery::new("SELECT VALUE COUNT(1) FROM c WHERE c.age > 30")), vec![json!(2)]);
        assert_eq!(run(SqlQuery::new("SELECT COUNT(1) FROM c")), vec![json!({ "$1": 4 })]);
        assert_eq!(
            run(SqlQuery::new("SELECT VALUE c.address.city FROM c")),
            vec![json!("London"), json!("Wilmslow")]
        );
    }

    #[test]
    fn unbound_parameters_are_rejected() {
        let query = SqlQuery::new("SELECT * FROM c WHERE c.id = @missing");
        let statement = parse(query.text()).unwrap();

        assert!(matches!(
            execute(&statement, &query, items().iter()),
            Err(FeedError::InvalidQuery(_))
        ));
    }
}
