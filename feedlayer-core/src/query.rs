//! Query construction, filtering and SQL rendering.
//!
//! Two ways of asking a container for items exist:
//!
//! - raw query text in the service's SQL dialect, carried by [`SqlQuery`] together with
//!   named parameters;
//! - structured filters built with [`Filter`] (optionally wrapped in a [`Select`] with sort
//!   and offset/limit), rendered to [`SqlQuery`] by [`SqlRenderer`].
//!
//! ```ignore
//! use feedlayer::query::{Filter, Select, SortDirection};
//!
//! let select = Select::builder()
//!     .filter(Filter::eq("status", "active").and(Filter::gt("age", 18)))
//!     .sort("name", SortDirection::Asc)
//!     .build();
//!
//! let sql = select.to_sql()?;
//! assert_eq!(
//!     sql.text(),
//!     "SELECT * FROM c WHERE (c.status = @p0 AND c.age > @p1) ORDER BY c.name ASC",
//! );
//! ```
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Membership: `any_of`, `none_of`
//! - Logical: `and`, `or`, plus the chainable [`Expr::and`], [`Expr::or`], [`Expr::not`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{FeedError, FeedResult},
    page::PaginationParams,
};

/// Alias the renderer uses for the container root in generated queries.
pub const ROOT_ALIAS: &str = "c";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The dotted field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains substring, or array contains element.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field value is one of the listed values.
    AnyOf,
    /// Field value is none of the listed values.
    NoneOf,
}

/// A filter expression over item fields.
///
/// Field names are dotted paths relative to the item root (`"address.city"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression.
    Not(Box<Expr>),
    /// Checks whether a field is defined.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Value,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Value) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Helper struct for constructing filter expressions.
///
/// ```ignore
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches items where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches items where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches items where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches items where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches items where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches items where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches items where the string field starts with the value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches items where the string field ends with the value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches items where the string field contains the substring, or the array field
    /// contains the element.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Negation of [`Filter::contains`].
    pub fn not_contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches items where the field is defined.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches items where the field is not defined.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines expressions so that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines expressions so that any may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches items where the field equals one of the values.
    ///
    /// A non-array value is treated as a one-element list.
    pub fn any_of(field: impl Into<String>, values: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, values.into())
    }

    /// Matches items where the field equals none of the values.
    pub fn none_of(field: impl Into<String>, values: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, values.into())
    }
}

/// A structured selection: filter, sort and offset/limit.
///
/// Rendered to raw query text with [`Select::to_sql`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    /// Optional filter expression.
    pub filter: Option<Expr>,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
    /// Number of items to skip.
    pub offset: Option<usize>,
    /// Sort specification.
    pub sort: Option<Sort>,
}

impl Select {
    /// Creates a selection matching every item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for fluent construction.
    pub fn builder() -> SelectBuilder {
        SelectBuilder::new()
    }

    /// Renders this selection to query text with parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidQuery`] if a field path is empty.
    pub fn to_sql(&self) -> FeedResult<SqlQuery> {
        SqlRenderer::new().render_select(self)
    }
}

impl From<Expr> for Select {
    fn from(filter: Expr) -> Self {
        Select { filter: Some(filter), ..Select::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectBuilder {
    select: Select,
}

impl SelectBuilder {
    /// Creates a new selection builder.
    pub fn new() -> Self {
        SelectBuilder { select: Select::default() }
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.select.filter = Some(filter);
        self
    }

    /// Sets the maximum number of items to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.select.limit = Some(limit);
        self
    }

    /// Sets the number of items to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.select.offset = Some(offset);
        self
    }

    /// Sets the sort specification.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.select.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Builds and returns the final selection.
    pub fn build(self) -> Select {
        self.select
    }
}

/// A named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    /// Parameter name including the leading `@`.
    pub name: String,
    /// Parameter value.
    pub value: Value,
}

/// Raw query text in the service's SQL dialect, with named parameters.
///
/// Serializes to the `{"query": ..., "parameters": [...]}` body the service accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlQuery {
    #[serde(rename = "query")]
    text: String,
    #[serde(default)]
    parameters: Vec<SqlParameter>,
}

impl SqlQuery {
    /// Creates a query from text with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), parameters: Vec::new() }
    }

    /// Adds (or replaces) a named parameter. A missing `@` prefix is added.
    pub fn with_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = if name.starts_with('@') { name.to_string() } else { format!("@{name}") };
        let value = value.into();

        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.parameters.push(SqlParameter { name, value }),
        }

        self
    }

    /// Appends an `OFFSET @row LIMIT @size` clause for one page of results.
    ///
    /// `page` is 1-based; page 0 is treated as page 1.
    pub fn paged(mut self, page: usize, page_size: usize) -> Self {
        let params = PaginationParams::new(page, page_size);

        self.text.push_str(" OFFSET @row LIMIT @size");
        self.with_parameter("@row", params.offset() as u64)
            .with_parameter("@size", params.limit() as u64)
    }

    /// Returns the query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the parameters.
    pub fn parameters(&self) -> &[SqlParameter] {
        &self.parameters
    }

    /// Looks up a parameter value by name (with or without the `@` prefix).
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        let name = name.trim_start_matches('@');

        self.parameters
            .iter()
            .find(|p| p.name.trim_start_matches('@') == name)
            .map(|p| &p.value)
    }
}

impl From<&str> for SqlQuery {
    fn from(text: &str) -> Self {
        SqlQuery::new(text)
    }
}

impl From<String> for SqlQuery {
    fn from(text: String) -> Self {
        SqlQuery::new(text)
    }
}

impl From<&String> for SqlQuery {
    fn from(text: &String) -> Self {
        SqlQuery::new(text.as_str())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<FeedError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Renders filter expressions to the service's SQL dialect.
///
/// Values are never inlined; each one becomes an `@pN` parameter.
#[derive(Debug, Default)]
pub struct SqlRenderer {
    parameters: Vec<SqlParameter>,
}

impl SqlRenderer {
    /// Creates a renderer with no parameters bound yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders a whole selection into a query.
    pub fn render_select(mut self, select: &Select) -> FeedResult<SqlQuery> {
        let mut text = format!("SELECT * FROM {ROOT_ALIAS}");

        if let Some(filter) = &select.filter {
            text.push_str(" WHERE ");
            text.push_str(&self.visit_expr(filter)?);
        }

        if let Some(sort) = &select.sort {
            text.push_str(" ORDER BY ");
            text.push_str(&render_path(&sort.field)?);
            text.push_str(match sort.direction {
                SortDirection::Asc => " ASC",
                SortDirection::Desc => " DESC",
            });
        }

        if select.offset.is_some() || select.limit.is_some() {
            let offset = self.bind(Value::from(select.offset.unwrap_or(0) as u64));
            let limit = self.bind(Value::from(select.limit.unwrap_or(u32::MAX as usize) as u64));
            text.push_str(&format!(" OFFSET {offset} LIMIT {limit}"));
        }

        Ok(SqlQuery { text, parameters: self.parameters })
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push(SqlParameter { name: name.clone(), value });
        name
    }
}

/// Renders a dotted field path (`address.city`) as a root-relative property path.
///
/// Segments that are not plain identifiers use the bracket form (`c["first-name"]`).
pub fn render_path(field: &str) -> FeedResult<String> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(FeedError::InvalidQuery(format!("invalid field path `{field}`")));
    }

    let mut path = ROOT_ALIAS.to_string();
    for segment in field.split('.') {
        if is_identifier(segment) {
            path.push('.');
            path.push_str(segment);
        } else {
            path.push_str(&format!("[{}]", Value::String(segment.to_string())));
        }
    }

    Ok(path)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();

    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl QueryVisitor for SqlRenderer {
    type Output = String;
    type Error = FeedError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok("true".into());
        }

        let parts = exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(format!("({})", parts.join(" AND ")))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok("false".into());
        }

        let parts = exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(format!("({})", parts.join(" OR ")))
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(format!("NOT ({})", self.visit_expr(expr)?))
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let path = render_path(field)?;

        Ok(if should_exist {
            format!("IS_DEFINED({path})")
        } else {
            format!("NOT IS_DEFINED({path})")
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let path = render_path(field)?;

        let contains = |renderer: &mut Self| {
            let param = renderer.bind(value.clone());
            if value.is_string() {
                format!(
                    "((IS_ARRAY({path}) AND ARRAY_CONTAINS({path}, {param})) OR (IS_STRING({path}) AND CONTAINS({path}, {param})))"
                )
            } else {
                format!("(IS_ARRAY({path}) AND ARRAY_CONTAINS({path}, {param}))")
            }
        };
        let listed = |renderer: &mut Self| {
            let values = match value {
                Value::Array(_) => value.clone(),
                other => Value::Array(vec![other.clone()]),
            };
            let param = renderer.bind(values);
            format!("ARRAY_CONTAINS({param}, {path})")
        };

        Ok(match op {
            FieldOp::Eq => format!("{path} = {}", self.bind(value.clone())),
            FieldOp::Ne => format!("{path} != {}", self.bind(value.clone())),
            FieldOp::Gt => format!("{path} > {}", self.bind(value.clone())),
            FieldOp::Gte => format!("{path} >= {}", self.bind(value.clone())),
            FieldOp::Lt => format!("{path} < {}", self.bind(value.clone())),
            FieldOp::Lte => format!("{path} <= {}", self.bind(value.clone())),
            FieldOp::StartsWith => format!("STARTSWITH({path}, {})", self.bind(value.clone())),
            FieldOp::EndsWith => format!("ENDSWITH({path}, {})", self.bind(value.clone())),
            FieldOp::Contains => contains(self),
            FieldOp::NotContains => format!("NOT {}", contains(self)),
            FieldOp::AnyOf => listed(self),
            FieldOp::NoneOf => format!("NOT {}", listed(self)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_filters_with_parameters() {
        let sql = Select::from(
            Filter::eq("status", "active")
                .and(Filter::gte("age", 18))
                .and(Filter::starts_with("address.city", "Os").not()),
        )
        .to_sql()
        .unwrap();

        assert_eq!(
            sql.text(),
            "SELECT * FROM c WHERE (c.status = @p0 AND c.age >= @p1 AND NOT (STARTSWITH(c.address.city, @p2)))"
        );
        assert_eq!(sql.parameter("p0"), Some(&json!("active")));
        assert_eq!(sql.parameter("@p1"), Some(&json!(18)));
        assert_eq!(sql.parameter("p2"), Some(&json!("Os")));
    }

    #[test]
    fn renders_sort_offset_limit_and_bracket_paths() {
        let sql = Select::builder()
            .filter(Filter::exists("first-name"))
            .sort("created", SortDirection::Desc)
            .offset(20)
            .limit(10)
            .build()
            .to_sql()
            .unwrap();

        assert_eq!(
            sql.text(),
            r#"SELECT * FROM c WHERE IS_DEFINED(c["first-name"]) ORDER BY c.created DESC OFFSET @p0 LIMIT @p1"#
        );
        assert_eq!(sql.parameter("p0"), Some(&json!(20)));
        assert_eq!(sql.parameter("p1"), Some(&json!(10)));
    }

    #[test]
    fn renders_membership_and_contains() {
        let sql = Select::from(Filter::or([
            Filter::any_of("tier", json!(["gold", "silver"])),
            Filter::contains("tags", "sale"),
            Filter::none_of("region", "eu"),
        ]))
        .to_sql()
        .unwrap();

        assert_eq!(
            sql.text(),
            "SELECT * FROM c WHERE (ARRAY_CONTAINS(@p0, c.tier) OR ((IS_ARRAY(c.tags) AND ARRAY_CONTAINS(c.tags, @p1)) OR (IS_STRING(c.tags) AND CONTAINS(c.tags, @p1))) OR NOT ARRAY_CONTAINS(@p2, c.region))"
        );
        assert_eq!(sql.parameter("p2"), Some(&json!(["eu"])));
    }

    #[test]
    fn rejects_empty_paths() {
        assert!(matches!(
            Select::from(Filter::eq("a..b", 1)).to_sql(),
            Err(FeedError::InvalidQuery(_))
        ));
    }

    #[test]
    fn paged_appends_offset_limit() {
        let second = SqlQuery::new("SELECT * FROM c").paged(2, 10);
        assert_eq!(second.text(), "SELECT * FROM c OFFSET @row LIMIT @size");
        assert_eq!(second.parameter("row"), Some(&json!(10)));
        assert_eq!(second.parameter("size"), Some(&json!(10)));

        let first = SqlQuery::new("SELECT * FROM c").paged(1, 5);
        assert_eq!(first.parameter("row"), Some(&json!(0)));
        assert_eq!(first.parameter("size"), Some(&json!(5)));
    }
}
