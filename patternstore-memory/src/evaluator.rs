//! Filter evaluation for in-memory document matching.
//!
//! A filter document is parsed once into an [`Expr`] tree, its regular expressions are
//! compiled once, and the result is evaluated against each stored document by walking the
//! tree with [`DocumentEvaluator`].

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, Regex as BsonRegex, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use patternstore_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::{DocumentStoreError, DocumentStoreResult},
};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so that `1`, `1i64` and `1.0` compare equal.
/// Values of different kinds are never ordered against each other.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Binary(u8, &'a [u8]),
    Pattern(&'a str, &'a str),
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no meaningful comparison (timestamps, code, ...)
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Binary(binary) => Comparable::Binary(u8::from(binary.subtype), &binary.bytes),
            Bson::RegularExpression(regex) => {
                Comparable::Pattern(regex.pattern.as_str(), regex.options.as_str())
            }
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Binary(a, x), Comparable::Binary(b, y)) => a == b && x == y,
            (Comparable::Pattern(a, x), Comparable::Pattern(b, y)) => a == b && x == y,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Compiled regular expressions, keyed by `/pattern/options`.
type Patterns = HashMap<String, Regex>;

fn pattern_key(regex: &BsonRegex) -> String {
    format!("/{}/{}", regex.pattern.as_str(), regex.options.as_str())
}

fn compile(regex: &BsonRegex) -> DocumentStoreResult<Regex> {
    let options = regex.options.as_str();

    RegexBuilder::new(regex.pattern.as_str())
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| DocumentStoreError::InvalidDocument(format!("invalid regular expression: {e}")))
}

fn collect_patterns(expr: &Expr, patterns: &mut Patterns) -> DocumentStoreResult<()> {
    match expr {
        Expr::And(exprs) | Expr::Or(exprs) => {
            for expr in exprs {
                collect_patterns(expr, patterns)?;
            }
        }
        Expr::Not(expr) => collect_patterns(expr, patterns)?,
        Expr::Exists(..) => {}
        Expr::Field { value, .. } => {
            let candidates = match value {
                Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                single => vec![single],
            };

            for candidate in candidates {
                if let Bson::RegularExpression(regex) = candidate {
                    let key = pattern_key(regex);
                    if !patterns.contains_key(&key) {
                        patterns.insert(key, compile(regex)?);
                    }
                }
            }
        }
    }

    Ok(())
}

/// A parsed filter, ready to be matched against any number of documents.
#[derive(Debug)]
pub(crate) struct Filter {
    expr: Expr,
    patterns: Patterns,
}

impl Filter {
    /// Parses a filter document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for unsupported operators or invalid
    /// regular expressions.
    pub fn new(filter: &Document) -> DocumentStoreResult<Self> {
        let expr = Expr::parse(filter)?;
        let mut patterns = Patterns::new();
        collect_patterns(&expr, &mut patterns)?;

        Ok(Self { expr, patterns })
    }

    pub fn matches(&self, document: &Document) -> DocumentStoreResult<bool> {
        DocumentEvaluator::new(document, &self.patterns).evaluate(&self.expr)
    }

    /// Returns the documents matching this filter, in storage order.
    pub fn filter_documents<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d Document>,
    ) -> DocumentStoreResult<Vec<&'d Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if self.matches(document)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    /// The fields pinned to a single value by this filter, used to seed upserted documents.
    pub fn equalities(&self) -> Document {
        let mut seed = Document::new();
        collect_equalities(&self.expr, &mut seed);
        seed
    }
}

fn collect_equalities(expr: &Expr, seed: &mut Document) {
    match expr {
        Expr::And(exprs) => {
            for expr in exprs {
                collect_equalities(expr, seed);
            }
        }
        Expr::Field { field, op: FieldOp::Eq, value } if !field.contains('.') => {
            seed.insert(field.clone(), value.clone());
        }
        _ => {}
    }
}

/// Resolves a dotted path, descending into arrays element-wise.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut found = Vec::new();
    resolve_into(document, path, &mut found);
    found
}

fn resolve_into<'a>(document: &'a Document, path: &str, found: &mut Vec<&'a Bson>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let Some(value) = document.get(head) else {
        return;
    };

    match rest {
        None => found.push(value),
        Some(rest) => match value {
            Bson::Document(nested) => resolve_into(nested, rest, found),
            Bson::Array(items) => {
                let (index, remainder) = match rest.split_once('.') {
                    Some((index, remainder)) => (index, Some(remainder)),
                    None => (rest, None),
                };

                match (index.parse::<usize>().ok().and_then(|i| items.get(i)), remainder) {
                    (Some(item), None) => found.push(item),
                    (Some(Bson::Document(nested)), Some(remainder)) => resolve_into(nested, remainder, found),
                    (Some(_), Some(_)) => {}
                    (None, _) => {
                        for item in items {
                            if let Bson::Document(nested) = item {
                                resolve_into(nested, rest, found);
                            }
                        }
                    }
                }
            }
            _ => {}
        },
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    patterns: &'a Patterns,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document, patterns: &'a Patterns) -> Self {
        Self { document, patterns }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    fn is_match(&self, regex: &BsonRegex, candidate: &Bson) -> DocumentStoreResult<bool> {
        let compiled = self
            .patterns
            .get(&pattern_key(regex))
            .ok_or_else(|| DocumentStoreError::InvalidDocument("regular expression was not compiled".into()))?;

        Ok(match candidate {
            Bson::String(text) => compiled.is_match(text),
            Bson::RegularExpression(stored) => pattern_key(stored) == pattern_key(regex),
            Bson::Array(items) => items.iter().any(|item| match item {
                Bson::String(text) => compiled.is_match(text),
                _ => false,
            }),
            _ => false,
        })
    }

    /// Equality as queries see it: a value matches itself, and an array matches any of its
    /// elements. A missing field equals `null`.
    fn equals(&self, values: &[&Bson], expected: &Bson) -> DocumentStoreResult<bool> {
        if let Bson::RegularExpression(regex) = expected {
            for value in values {
                if self.is_match(regex, value)? {
                    return Ok(true);
                }
            }

            return Ok(false);
        }

        if values.is_empty() {
            return Ok(matches!(expected, Bson::Null));
        }

        let expected = Comparable::from(expected);

        Ok(values.iter().any(|value| {
            let actual = Comparable::from(*value);

            actual == expected
                || matches!(&actual, Comparable::Array(items) if items.iter().any(|item| item == &expected))
        }))
    }

    fn compares(&self, values: &[&Bson], op: &FieldOp, expected: &Bson) -> bool {
        let expected = Comparable::from(expected);
        let accepts = |ordering: Ordering| match op {
            FieldOp::Gt => ordering == Ordering::Greater,
            FieldOp::Gte => ordering != Ordering::Less,
            FieldOp::Lt => ordering == Ordering::Less,
            FieldOp::Lte => ordering != Ordering::Greater,
            _ => false,
        };

        values.iter().any(|value| match Comparable::from(*value) {
            Comparable::Array(items) => items
                .iter()
                .any(|item| item.partial_cmp(&expected).is_some_and(accepts)),
            actual => actual.partial_cmp(&expected).is_some_and(accepts),
        })
    }

    fn any_of(&self, values: &[&Bson], candidates: &Bson) -> DocumentStoreResult<bool> {
        let candidates = candidates
            .as_array()
            .ok_or_else(|| DocumentStoreError::InvalidDocument("$in and $nin expect an array".into()))?;

        for candidate in candidates {
            if self.equals(values, candidate)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(!resolve(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let values = resolve(self.document, field);

        match op {
            FieldOp::Eq => self.equals(&values, value),
            FieldOp::Ne => Ok(!self.equals(&values, value)?),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                Ok(self.compares(&values, op, value))
            }
            FieldOp::In => self.any_of(&values, value),
            FieldOp::Nin => Ok(!self.any_of(&values, value)?),
            FieldOp::Regex => match value {
                Bson::RegularExpression(regex) => {
                    for candidate in &values {
                        if self.is_match(regex, candidate)? {
                            return Ok(true);
                        }
                    }

                    Ok(false)
                }
                _ => Err(DocumentStoreError::InvalidDocument("$regex expects a regular expression".into())),
            },
        }
    }
}
