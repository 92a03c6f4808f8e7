use serde_json::Value;

use crate::models::SourceError;
use crate::offsets::{DerivedOffsets, OffsetStrategy};
use crate::template;

/// Offset-from-record cursor: each record's offset is read from a JSON
/// pointer applied to the record itself; the persisted cursor is the last
/// such value of the batch.
pub struct RecordPointerStrategy {
    pointer: String,
    cursor: Option<String>,
    initial: Option<String>,
}

impl RecordPointerStrategy {
    pub fn new(pointer: String, initial: Option<String>, stored: Option<String>) -> Self {
        Self {
            pointer,
            cursor: stored.or_else(|| initial.clone()),
            initial,
        }
    }
}

impl OffsetStrategy for RecordPointerStrategy {
    fn current_cursor(&self) -> Option<String> {
        self.cursor.clone()
    }

    fn advance(&mut self, next: Option<String>) {
        if next.is_some() {
            self.cursor = next;
        }
    }

    fn reset(&mut self) {
        self.cursor = self.initial.clone();
    }

    fn derive_next(
        &mut self,
        _body: &Value,
        records: &[Value],
    ) -> crate::models::Result<DerivedOffsets> {
        let mut per_record = Vec::with_capacity(records.len());
        for record in records {
            let value = template::pointer_as_string(record, &self.pointer).ok_or_else(|| {
                SourceError::DataFormat(format!(
                    "Offset pointer {} yielded no value for record",
                    self.pointer
                ))
            })?;
            per_record.push(value);
        }
        Ok(DerivedOffsets {
            cursor: per_record.last().cloned().or_else(|| self.cursor.clone()),
            per_record: Some(per_record),
        })
    }
}
