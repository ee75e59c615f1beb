//! Pagination view over the resolved parameter mapping.
//!
//! Recognized keys are `skip`, `limit`, `wlt`, `wgt`, `wkey` and `ids`;
//! every other key is ignored. The `wlt`/`wgt`/`wkey` trio expresses a
//! cursor filter ("where value less-than / greater-than / key-equals")
//! for cursor-based pagination, as opposed to the offset-based
//! `skip`/`limit` pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::{ParamError, Params, coerce_int, coerce_string, shape_name};

/// Default page size when `limit` is absent, negative or unparseable.
pub const PAGE_SIZE: i64 = 30;

/// Default offset when `skip` is absent or unparseable.
const SKIP: i64 = 0;

/// Read-only pagination/cursor-filter view derived from request
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginator {
    pub skip: i64,
    pub limit: i64,
    pub wlt: String,
    pub wgt: String,
    pub wkey: String,
    pub ids: Vec<String>,
}

impl Paginator {
    /// Classifies the recognized keys out of a parameter mapping.
    ///
    /// Numeric fields accept an integer, a float (truncated toward zero)
    /// or a numeric string; a parse failure falls back to the field's
    /// default instead of failing the request. A negative `limit` is
    /// normalized to [`PAGE_SIZE`], while zero is a meaningful limit and
    /// is preserved.
    ///
    /// `ids` accepts a bare string (one-element list) or a list of
    /// strings; any other shape is reported as a [`ParamError`].
    pub(crate) fn from_params(params: &Params) -> Result<Self, ParamError> {
        let mut paginator = Paginator { limit: -1, ..Default::default() };

        for (key, value) in params.iter() {
            match key.as_str() {
                "skip" => paginator.skip = coerce_int(value, SKIP),
                "limit" => paginator.limit = coerce_int(value, PAGE_SIZE),
                "wlt" => paginator.wlt = coerce_string(value),
                "wgt" => paginator.wgt = coerce_string(value),
                "wkey" => paginator.wkey = coerce_string(value),
                "ids" => paginator.ids = ids_list(value)?,
                _ => {}
            }
        }

        if paginator.limit < 0 {
            paginator.limit = PAGE_SIZE;
        }

        Ok(paginator)
    }
}

fn ids_list(value: &Value) -> Result<Vec<String>, ParamError> {
    match value {
        Value::String(id) => Ok(vec![id.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(id) => Ok(id.clone()),
                other => Err(ParamError::bad_ids(shape_name(other))),
            })
            .collect(),
        other => Err(ParamError::bad_ids(shape_name(other))),
    }
}
