use serde_json::Value;

use crate::models::SourceError;
use crate::offsets::{DerivedOffsets, OffsetStrategy};

/// Monotonically increasing integer cursor encoded as a string. Advances by
/// one per record; strictly increasing across restarts because the persisted
/// value always covers every emitted record.
pub struct SimpleIncrementingStrategy {
    cursor: i64,
    initial: i64,
}

impl SimpleIncrementingStrategy {
    pub fn new(initial: Option<&str>, stored: Option<String>) -> crate::models::Result<Self> {
        let initial = match initial {
            Some(raw) => raw.parse().map_err(|_| {
                SourceError::Configuration(format!(
                    "Initial offset must be an integer for SIMPLE_INCREMENTING, got: {}",
                    raw
                ))
            })?,
            None => 0,
        };
        let cursor = match stored {
            Some(raw) => raw.parse().map_err(|_| {
                SourceError::OffsetStore(format!("Stored offset is not an integer: {}", raw))
            })?,
            None => initial,
        };
        Ok(Self { cursor, initial })
    }
}

impl OffsetStrategy for SimpleIncrementingStrategy {
    fn current_cursor(&self) -> Option<String> {
        Some(self.cursor.to_string())
    }

    fn advance(&mut self, next: Option<String>) {
        if let Some(v) = next.and_then(|s| s.parse().ok()) {
            self.cursor = v;
        }
    }

    fn reset(&mut self) {
        self.cursor = self.initial;
    }

    fn derive_next(
        &mut self,
        _body: &Value,
        records: &[Value],
    ) -> crate::models::Result<DerivedOffsets> {
        let per_record: Vec<String> = (1..=records.len() as i64)
            .map(|i| (self.cursor + i).to_string())
            .collect();
        let cursor = self.cursor + records.len() as i64;
        Ok(DerivedOffsets {
            cursor: Some(cursor.to_string()),
            per_record: Some(per_record),
        })
    }
}
