//! Pagination for `find`.
//!
//! A pattern carries an optional `options` mapping with `limit` and `offset`. These are parsed
//! into [`PaginationOptions`], resolved against the processor's configured ceiling, and pushed
//! down to the store as a skip-then-take window. The effective values are echoed back in the
//! find result.

use bson::{Bson, Document};

use crate::{
    error::{PatternError, PatternResult},
    query::Query,
};

pub const LIMIT_OPTION: &str = "limit";
pub const OFFSET_OPTION: &str = "offset";

/// The window requested by a pattern, or the effective window after resolution.
///
/// `None` means no explicit bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PaginationOptions {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }

    /// Reads `limit` and `offset` from a decoded `options` mapping. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidRequest`] if either value is present but is not a
    /// non-negative integer. `null` counts as absent, and so does a `limit` of zero, which
    /// the document store reads as "no limit".
    pub fn from_options(options: &Document) -> PatternResult<Self> {
        Ok(Self {
            limit: bound(options, LIMIT_OPTION)?.filter(|limit| *limit > 0),
            offset: bound(options, OFFSET_OPTION)?,
        })
    }

    /// Applies a configured ceiling to the requested limit.
    ///
    /// With a ceiling, a missing limit becomes the ceiling and a larger one is clamped to it.
    pub fn resolve(self, max_limit: Option<u64>) -> Self {
        let limit = match (self.limit, max_limit) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (None, max) => max,
            (limit, None) => limit,
        };

        Self { limit, offset: self.offset }
    }

    /// Builds the windowed store query for `filter`.
    pub fn to_query(self, filter: Document) -> Query {
        let mut builder = Query::builder().filter(filter);

        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }

        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }

        builder.build()
    }
}

fn bound(options: &Document, key: &str) -> PatternResult<Option<u64>> {
    let invalid = || PatternError::InvalidRequest(format!("options.{key} must be a non-negative integer"));

    match options.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Int32(value)) => u64::try_from(*value).map(Some).map_err(|_| invalid()),
        Some(Bson::Int64(value)) => u64::try_from(*value).map(Some).map_err(|_| invalid()),
        Some(Bson::Double(value)) if value.fract() == 0.0 && *value >= 0.0 && value.is_finite() => {
            Ok(Some(*value as u64))
        }
        Some(_) => Err(invalid()),
    }
}
