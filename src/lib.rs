//! uniquefile — identify and catalog files by content indicators.
//!
//! Each file's bytes are run through one or more indicators (length,
//! IEEE CRC-32, SHA-256, or a composite that drives several over a
//! single pass). The resulting `(key, value)` indication set is stored
//! in a repository keyed by resource URI, where boolean queries over
//! indication predicates locate matching resources — the groundwork
//! for deduplication and integrity auditing over large file
//! hierarchies.

pub mod config;
pub mod error;
pub mod indication;
pub mod indicator;
pub mod pipeline;
pub mod repository;
pub mod uri;

pub use config::{Config, DbConfig};
pub use error::{AppError, Result};
pub use indication::{Indication, IndicationPool};
pub use indicator::{
    parse_indicator, ByteSource, CompositeIndicator, FileSource, HashAndLengthIndicator,
    Indicator, IndicatorCompare, LengthIndicator, MemorySource,
};
pub use pipeline::{Pipeline, PipelineConfig};
pub use repository::{Repository, SqlRepository, UriQuery};
pub use uri::ResourceUri;
