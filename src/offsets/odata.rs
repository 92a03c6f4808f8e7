use regex::Regex;
use serde_json::Value;

use crate::models::{ODataSettings, ODataTokenMode, SourceError};
use crate::offsets::{CursorDisposition, DerivedOffsets, OffsetStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    None,
    Next,
    Delta,
}

/// Dual-link OData cursor: follows `@odata.nextLink` while paging, then
/// `@odata.deltaLink` for incremental changes, with a polling interval per
/// link kind. Persists either the full link or just the continuation token.
pub struct ODataStrategy {
    settings: ODataSettings,
    cursor: Option<String>,
    link_kind: LinkKind,
    initial: Option<String>,
    skiptoken_re: Regex,
    deltatoken_re: Regex,
}

fn token_regex(param: &str) -> crate::models::Result<Regex> {
    Regex::new(&format!(r"[?&]{}=([^&]*)", regex::escape(param))).map_err(|e| {
        SourceError::Configuration(format!("Invalid OData token parameter {}: {}", param, e))
    })
}

impl ODataStrategy {
    pub fn new(
        settings: &ODataSettings,
        initial: Option<String>,
        stored: Option<String>,
    ) -> crate::models::Result<Self> {
        let skiptoken_re = token_regex(&settings.skiptoken_param)?;
        let deltatoken_re = token_regex(&settings.deltatoken_param)?;
        let link_kind = match &stored {
            Some(link) if settings.token_mode == ODataTokenMode::FullUrl => {
                if deltatoken_re.is_match(link) {
                    LinkKind::Delta
                } else if skiptoken_re.is_match(link) {
                    LinkKind::Next
                } else {
                    LinkKind::None
                }
            }
            // Token-only cursors carry no kind; resume through the skip param
            Some(_) => LinkKind::Next,
            None => LinkKind::None,
        };
        Ok(Self {
            settings: settings.clone(),
            cursor: stored,
            link_kind,
            initial,
            skiptoken_re,
            deltatoken_re,
        })
    }

    fn persistable(&self, link: &str, kind: LinkKind) -> crate::models::Result<String> {
        match self.settings.token_mode {
            ODataTokenMode::FullUrl => Ok(link.to_string()),
            ODataTokenMode::TokenOnly => {
                let re = match kind {
                    LinkKind::Delta => &self.deltatoken_re,
                    _ => &self.skiptoken_re,
                };
                re.captures(link)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| {
                        SourceError::DataFormat(format!(
                            "OData link carries no continuation token: {}",
                            link
                        ))
                    })
            }
        }
    }

    fn link_from(&self, body: &Value, field: &str) -> Option<String> {
        body.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    }
}

impl OffsetStrategy for ODataStrategy {
    fn current_cursor(&self) -> Option<String> {
        self.cursor.clone().or_else(|| self.initial.clone())
    }

    fn advance(&mut self, next: Option<String>) {
        if next.is_none() {
            self.link_kind = LinkKind::None;
        }
        self.cursor = next;
    }

    fn reset(&mut self) {
        self.cursor = None;
        self.link_kind = LinkKind::None;
    }

    fn derive_next(
        &mut self,
        body: &Value,
        _records: &[Value],
    ) -> crate::models::Result<DerivedOffsets> {
        let derived = if let Some(link) = self.link_from(body, &self.settings.next_link_field) {
            self.link_kind = LinkKind::Next;
            Some(self.persistable(&link, LinkKind::Next)?)
        } else if let Some(link) = self.link_from(body, &self.settings.delta_link_field) {
            self.link_kind = LinkKind::Delta;
            Some(self.persistable(&link, LinkKind::Delta)?)
        } else {
            // End of data: next tick issues the base request again
            self.link_kind = LinkKind::None;
            None
        };
        Ok(DerivedOffsets {
            cursor: derived,
            per_record: None,
        })
    }

    fn request_cursor(&self) -> CursorDisposition {
        match &self.cursor {
            None => CursorDisposition::Template(self.initial.clone()),
            Some(cursor) => match self.settings.token_mode {
                ODataTokenMode::FullUrl => CursorDisposition::FullUrl(cursor.clone()),
                ODataTokenMode::TokenOnly => {
                    let name = match self.link_kind {
                        LinkKind::Delta => self.settings.deltatoken_param.clone(),
                        _ => self.settings.skiptoken_param.clone(),
                    };
                    CursorDisposition::QueryParam {
                        name,
                        value: cursor.clone(),
                    }
                }
            },
        }
    }

    fn interval_override(&self) -> Option<u64> {
        match self.link_kind {
            LinkKind::Next => self.settings.next_link_interval_ms,
            LinkKind::Delta => self.settings.delta_link_interval_ms,
            LinkKind::None => None,
        }
    }
}
