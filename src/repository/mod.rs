//! Persistence of `{URI → indication set}`.
//!
//! The repository stores one row per resource and one row per
//! `(key, value)` indication entry, and answers queries expressed as a
//! boolean tree of indication predicates. The SQL implementation lives
//! in [`sql`]; the query compiler that rewrites a predicate tree into
//! the repository's filter form lives in [`query`].

pub mod query;
mod sql;

pub use query::{compile, CompiledQuery, UriQuery};
pub use sql::SqlRepository;

use crate::error::{AppError, Result};
use crate::indication::Indication;
use crate::uri::ResourceUri;
use async_trait::async_trait;

/// Longest key the schema stores (`key` is a `VARCHAR(16)` column).
pub const MAX_KEY_LEN: usize = 16;

/// Store and query indication sets keyed by resource URI.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Retrieve the indication set recorded for `uri`, or `None` when
    /// the resource is unknown. Entry order in the returned buffer is
    /// unspecified.
    async fn indications(&self, uri: &ResourceUri) -> Result<Option<Indication>>;

    /// Add or replace `uri`'s indication set. Creates the resource row
    /// on first use; replacing is a diff, so unchanged `(key, value)`
    /// rows are left alone and the call is idempotent.
    async fn set_indications(&self, uri: &ResourceUri, ind: &Indication) -> Result<()>;

    /// Return the URIs whose indication sets match `query`.
    async fn uris(&self, query: &UriQuery) -> Result<Vec<ResourceUri>>;
}

/// Validate an indication key for storage: the schema keeps keys as
/// 16-character text.
pub(crate) fn key_as_text(key: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(key).map_err(|_| AppError::InvalidKey { key: key.to_vec() })?;
    if text.len() > MAX_KEY_LEN {
        return Err(AppError::InvalidKey { key: key.to_vec() });
    }
    Ok(text)
}
