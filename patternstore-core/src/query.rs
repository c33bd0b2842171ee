//! Query model and filter expressions.
//!
//! Filters arrive as documents in the familiar document-store query language
//! (`{"name": "peter"}`, `{"age": {"$gte": 18}}`, `{"$or": [...]}`) and are handed to
//! backends as-is inside a [`Query`]. Backends without a native query engine parse them into
//! an [`Expr`] tree with [`Expr::parse`] and walk it with a [`QueryVisitor`].
//!
//! # Supported filter language
//!
//! - Logical: `$and`, `$or`, `$nor`
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`
//! - Element: `$exists`
//! - Evaluation: `$regex` (with `$options`) and regular expression values
//! - Field-level negation: `$not`
//!
//! Dotted field names address nested documents.

use bson::{Bson, Document, Regex};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    extjson::{self, REF_TAG, REGEX_OPTIONS_TAG, REGEX_TAG},
};

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to. Matches arrays containing the value as well.
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
    /// Equal to any value of an array.
    In,
    /// Equal to none of the values of an array.
    Nin,
    /// String matches a regular expression.
    Regex,
}

/// A filter expression for querying documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The (possibly dotted) field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field: field.into(), op, value }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a filter document into an expression tree.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for unsupported operators or operands
    /// of the wrong type.
    pub fn parse(filter: &Document) -> DocumentStoreResult<Self> {
        let mut clauses = Vec::with_capacity(filter.len());

        for (key, value) in filter {
            match key.as_str() {
                "$and" => clauses.push(Expr::And(Self::parse_list(key, value)?)),
                "$or" => clauses.push(Expr::Or(Self::parse_list(key, value)?)),
                "$nor" => clauses.push(Expr::Or(Self::parse_list(key, value)?).not()),
                operator if operator.starts_with('$') => {
                    return Err(invalid(format!("unsupported top-level operator {operator}")));
                }
                field => clauses.push(Self::parse_condition(field, value)?),
            }
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Expr::And(clauses),
        })
    }

    fn parse_list(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
        value
            .as_array()
            .ok_or_else(|| invalid(format!("{operator} expects an array of filters")))?
            .iter()
            .map(|item| match item.as_document() {
                Some(filter) => Self::parse(filter),
                None => Err(invalid(format!("{operator} expects an array of filters"))),
            })
            .collect()
    }

    fn parse_condition(field: &str, value: &Bson) -> DocumentStoreResult<Self> {
        match value {
            Bson::RegularExpression(_) => Ok(Expr::field(field, FieldOp::Regex, value.clone())),
            Bson::Document(operators) if is_operator_document(operators) => {
                Self::parse_operators(field, operators)
            }
            _ => Ok(Expr::field(field, FieldOp::Eq, value.clone())),
        }
    }

    fn parse_operators(field: &str, operators: &Document) -> DocumentStoreResult<Self> {
        let mut clauses = Vec::with_capacity(operators.len());

        for (operator, operand) in operators {
            let clause = match operator.as_str() {
                "$eq" => Expr::field(field, FieldOp::Eq, operand.clone()),
                "$ne" => Expr::field(field, FieldOp::Ne, operand.clone()),
                "$gt" => Expr::field(field, FieldOp::Gt, operand.clone()),
                "$gte" => Expr::field(field, FieldOp::Gte, operand.clone()),
                "$lt" => Expr::field(field, FieldOp::Lt, operand.clone()),
                "$lte" => Expr::field(field, FieldOp::Lte, operand.clone()),
                "$in" | "$nin" => {
                    if operand.as_array().is_none() {
                        return Err(invalid(format!("{operator} expects an array")));
                    }
                    let op = if operator == "$in" { FieldOp::In } else { FieldOp::Nin };
                    Expr::field(field, op, operand.clone())
                }
                "$exists" => Expr::Exists(field.to_string(), truthy(operand)),
                REGEX_TAG => Expr::field(
                    field,
                    FieldOp::Regex,
                    Bson::RegularExpression(Self::regex_operand(operand, operators.get(REGEX_OPTIONS_TAG))?),
                ),
                // Consumed together with `$regex`.
                REGEX_OPTIONS_TAG if operators.contains_key(REGEX_TAG) => continue,
                "$not" => Self::parse_condition(field, operand)?.not(),
                other => return Err(invalid(format!("unsupported operator {other} on field {field}"))),
            };

            clauses.push(clause);
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Expr::And(clauses),
        })
    }

    fn regex_operand(source: &Bson, options: Option<&Bson>) -> DocumentStoreResult<Regex> {
        let options = match options {
            Some(Bson::String(options)) => options.as_str(),
            Some(_) => return Err(invalid("$options must be a string")),
            None => "",
        };

        match source {
            Bson::String(source) => extjson::pattern(source, options).map_err(|e| invalid(e.to_string())),
            Bson::RegularExpression(regex) if options.is_empty() => Ok(regex.clone()),
            Bson::RegularExpression(regex) => {
                extjson::pattern(regex.pattern.as_str(), options).map_err(|e| invalid(e.to_string()))
            }
            _ => Err(invalid("$regex must be a string or regular expression")),
        }
    }
}

/// A document is an operator document when its first key is an operator, except for
/// references, which compare as plain values.
fn is_operator_document(document: &Document) -> bool {
    !document.contains_key(REF_TAG)
        && document
            .keys()
            .next()
            .is_some_and(|key| key.starts_with('$'))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(number) => *number != 0,
        Bson::Int64(number) => *number != 0,
        Bson::Double(number) => *number != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn invalid(reason: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(reason.into())
}

/// A find request: the filter document plus the window to return.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use patternstore_core::query::Query;
///
/// let query = Query::builder()
///     .filter(doc! { "name": "jens" })
///     .offset(2)
///     .limit(10)
///     .build();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter document; empty matches every document.
    pub filter: Document,
    /// Number of documents to skip before the first returned one.
    pub offset: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl Query {
    /// Creates a query matching every document, without a window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter document.
    pub fn filter(mut self, filter: Document) -> Self {
        self.query.filter = filter;
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

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
        value: &Bson,
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

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(Expr::parse(&doc! {}).unwrap(), Expr::And(vec![]));
    }

    #[test]
    fn plain_values_are_equality() {
        assert_eq!(
            Expr::parse(&doc! { "name": "peter" }).unwrap(),
            Expr::field("name", FieldOp::Eq, Bson::String("peter".into()))
        );
    }

    #[test]
    fn operator_documents_expand_per_operator() {
        let expr = Expr::parse(&doc! { "age": { "$gte": 18, "$lt": 65 } }).unwrap();

        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::field("age", FieldOp::Gte, Bson::Int32(18)),
                Expr::field("age", FieldOp::Lt, Bson::Int32(65)),
            ])
        );
    }

    #[test]
    fn regex_operator_takes_its_options() {
        let expr = Expr::parse(&doc! { "name": { "$regex": "^jac", "$options": "i" } }).unwrap();

        match expr {
            Expr::Field { op: FieldOp::Regex, value: Bson::RegularExpression(regex), .. } => {
                assert_eq!(regex.pattern.as_str(), "^jac");
                assert_eq!(regex.options.as_str(), "i");
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn references_compare_as_values() {
        let reference = doc! { "$ref": "users", "$id": ObjectId::new() };
        let expr = Expr::parse(&doc! { "owner": reference.clone() }).unwrap();

        assert_eq!(expr, Expr::field("owner", FieldOp::Eq, Bson::Document(reference)));
    }

    #[test]
    fn logical_operators_nest() {
        let expr = Expr::parse(&doc! { "$nor": [ { "a": 1 }, { "b": { "$exists": false } } ] }).unwrap();

        assert_eq!(
            expr,
            Expr::Or(vec![
                Expr::field("a", FieldOp::Eq, Bson::Int32(1)),
                Expr::Exists("b".into(), false),
            ])
            .not()
        );
    }

    #[test]
    fn unsupported_operators_are_rejected() {
        assert!(Expr::parse(&doc! { "$where": "this.a > 1" }).is_err());
        assert!(Expr::parse(&doc! { "a": { "$near": [0, 0] } }).is_err());
        assert!(Expr::parse(&doc! { "a": { "$in": 3 } }).is_err());
        assert!(Expr::parse(&doc! { "$or": { "a": 1 } }).is_err());
    }

    #[test]
    fn builder_sets_window() {
        let query = Query::builder().filter(doc! { "a": 1 }).offset(2).limit(10).build();

        assert_eq!(query.filter, doc! { "a": 1 });
        assert_eq!(query.offset, Some(2));
        assert_eq!(query.limit, Some(10));
    }
}
