pub mod odata;
pub mod pagination;
pub mod record_pointer;
pub mod simple;

pub use odata::*;
pub use pagination::*;
pub use record_pointer::*;
pub use simple::*;

use serde_json::Value;

use crate::models::{EndpointSettings, ODataTokenMode, OffsetMode, SourceError};

/// What a fetched response did to the cursor: the value to persist after the
/// batch is emitted, and optionally one offset per record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedOffsets {
    pub cursor: Option<String>,
    pub per_record: Option<Vec<String>>,
}

/// How the current cursor participates in the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorDisposition {
    /// Substituted into templates as `${offset}`.
    Template(Option<String>),
    /// A persisted link used verbatim as the absolute URL, or as the path
    /// when it starts with `/`.
    FullUrl(String),
    /// A bare token re-attached under a configured query parameter.
    QueryParam { name: String, value: String },
}

/// Cursor contract of one endpoint. Single-writer: only the owning endpoint
/// mutates it.
pub trait OffsetStrategy: Send {
    /// Cursor as it should be exposed for the next request.
    fn current_cursor(&self) -> Option<String>;

    /// Adopt the cursor derived from the last response.
    fn advance(&mut self, next: Option<String>);

    /// Back to the configured initial value.
    fn reset(&mut self);

    /// Inspect a successful response and compute the cursor to persist plus
    /// optional per-record offsets.
    fn derive_next(
        &mut self,
        body: &Value,
        records: &[Value],
    ) -> crate::models::Result<DerivedOffsets>;

    fn request_cursor(&self) -> CursorDisposition {
        CursorDisposition::Template(self.current_cursor())
    }

    /// Pacing override, used by the OData dual-interval mode.
    fn interval_override(&self) -> Option<u64> {
        None
    }
}

/// Stable partition key URL for an endpoint: base ⊕ path for every strategy
/// except OData TokenOnly, which keys by the base alone so the partition
/// matches across token re-attachment.
pub fn partition_url(endpoint: &EndpointSettings, base_url: &str) -> String {
    if endpoint.offset_mode == OffsetMode::ODataPagination
        && endpoint.odata.token_mode == ODataTokenMode::TokenOnly
    {
        base_url.to_string()
    } else {
        endpoint.url_template(base_url)
    }
}

/// Select and seed a strategy from endpoint configuration and the offset
/// loaded from the store (empty string means "no stored cursor").
pub fn build_strategy(
    endpoint: &EndpointSettings,
    stored: Option<String>,
) -> crate::models::Result<Box<dyn OffsetStrategy>> {
    let stored = stored.filter(|s| !s.is_empty());
    match endpoint.offset_mode {
        OffsetMode::SimpleIncrementing => Ok(Box::new(SimpleIncrementingStrategy::new(
            endpoint.initial_offset.as_deref(),
            stored,
        )?)),
        OffsetMode::Chaining => {
            let pointer = endpoint.offset_pointer.clone().ok_or_else(|| {
                SourceError::Configuration(format!(
                    "{}: CHAINING offset mode requires an offset pointer",
                    endpoint.id
                ))
            })?;
            Ok(Box::new(RecordPointerStrategy::new(
                pointer,
                endpoint.initial_offset.clone(),
                stored,
            )))
        }
        OffsetMode::CursorPagination => {
            let pointer = endpoint.next_page_pointer.clone().ok_or_else(|| {
                SourceError::Configuration(format!(
                    "{}: CURSOR_PAGINATION requires a next page pointer",
                    endpoint.id
                ))
            })?;
            Ok(Box::new(CursorPaginationStrategy::new(
                pointer,
                endpoint.initial_offset.clone(),
                stored,
            )))
        }
        OffsetMode::SnapshotPagination => {
            let pointer = endpoint.offset_pointer.clone().ok_or_else(|| {
                SourceError::Configuration(format!(
                    "{}: SNAPSHOT_PAGINATION requires an offset pointer",
                    endpoint.id
                ))
            })?;
            Ok(Box::new(SnapshotPaginationStrategy::new(
                pointer,
                endpoint.initial_offset.clone(),
                stored,
            )))
        }
        OffsetMode::ODataPagination => Ok(Box::new(ODataStrategy::new(
            &endpoint.odata,
            endpoint.initial_offset.clone(),
            stored,
        )?)),
    }
}
