//! Cursor pagination over identifier order.
//!
//! A page is produced by fetching `limit + 1` rows past the cursor in the
//! requested direction; the extra row only proves that another page exists.
//! Pages are independent reads: rows inserted or removed behind the cursor
//! between two requests can be skipped or repeated at the boundary.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ClinicError;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Cursor predicate: `id > cursor` ascending, `id < cursor` descending.
    pub fn sql_comparator(self) -> &'static str {
        match self {
            SortDirection::Asc => " > ",
            SortDirection::Desc => " < ",
        }
    }

    pub fn sql_order(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Opaque continuation token.
///
/// Wire form is URL-safe base64 of `<fingerprint>.<last id>`; the fingerprint
/// binds the token to the filter and sort it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    fingerprint: String,
    last_id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}.{}", self.fingerprint, self.last_id))
    }

    pub fn decode(token: &str) -> Result<Self, ClinicError> {
        let malformed = || ClinicError::validation("INVALID_CURSOR", "cursor is malformed");

        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| malformed())?;
        let text = String::from_utf8(bytes).map_err(|_| malformed())?;
        let (fingerprint, id) = text.split_once('.').ok_or_else(malformed)?;
        if fingerprint.is_empty() {
            return Err(malformed());
        }
        let last_id = Uuid::parse_str(id).map_err(|_| malformed())?;

        Ok(Self {
            fingerprint: fingerprint.to_string(),
            last_id,
        })
    }

    pub fn last_id(&self) -> Uuid {
        self.last_id
    }
}

/// Short digest of `(kind, filter, sort)`.
pub fn fingerprint<F: Serialize>(kind: &str, filter: &F, sort: SortDirection) -> String {
    // serializing a struct is field-order stable, so equal filters hash equal
    let canonical = serde_json::json!({ "kind": kind, "filter": filter, "sort": sort });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// A validated request for one page of one collection.
#[derive(Debug, Clone)]
pub struct PageRequest {
    sort: SortDirection,
    limit: u32,
    after: Option<Uuid>,
    fingerprint: String,
}

impl PageRequest {
    /// Validate caller input against the filter it will run with.
    ///
    /// `limit` defaults to [`DEFAULT_PAGE_LIMIT`], must be positive, and is
    /// clamped to `max_limit`. A cursor minted under a different filter or
    /// sort is rejected rather than silently reinterpreted.
    pub fn build<F: Serialize>(
        kind: &str,
        filter: &F,
        sort: Option<SortDirection>,
        cursor: Option<&str>,
        limit: Option<i64>,
        max_limit: u32,
    ) -> Result<Self, ClinicError> {
        let sort = sort.unwrap_or_default();
        let max_limit = max_limit.max(1);

        let limit = match limit {
            None => DEFAULT_PAGE_LIMIT.min(max_limit),
            Some(n) if n <= 0 => {
                return Err(ClinicError::validation(
                    "INVALID_LIMIT",
                    "limit must be a positive integer",
                ));
            }
            Some(n) => u32::try_from(n).unwrap_or(u32::MAX).min(max_limit),
        };

        let fingerprint = fingerprint(kind, filter, sort);

        let after = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
            None => None,
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                if cursor.fingerprint != fingerprint {
                    tracing::warn!(kind, "cursor presented with different filters");
                    return Err(ClinicError::validation(
                        "CURSOR_MISMATCH",
                        "cursor was issued for a different filter or sort",
                    ));
                }
                Some(cursor.last_id())
            }
        };

        Ok(Self {
            sort,
            limit,
            after,
            fingerprint,
        })
    }

    pub fn sort(&self) -> SortDirection {
        self.sort
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Identifier of the last row of the previous page.
    pub fn after(&self) -> Option<Uuid> {
        self.after
    }

    /// Rows a store should return for this request: one more than `limit`.
    pub fn fetch_limit(&self) -> usize {
        self.limit as usize + 1
    }

    /// Turn an over-fetched, already ordered row set into a page.
    pub fn finish<T>(&self, mut rows: Vec<T>, id_of: impl Fn(&T) -> Uuid) -> Page<T> {
        let has_next_page = rows.len() > self.limit as usize;
        rows.truncate(self.limit as usize);

        let next_cursor = rows.last().map(|last| {
            Cursor {
                fingerprint: self.fingerprint.clone(),
                last_id: id_of(last),
            }
            .encode()
        });

        Page {
            items: rows,
            has_next_page,
            next_cursor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub next_cursor: Option<String>,
}
