use std::collections::HashMap;

/// Partition and offset handed to the downstream sink are opaque string maps,
/// matching the durable `(partition, offset)` layout of the offset store.
pub type SourcePartition = HashMap<String, String>;
pub type SourceOffset = HashMap<String, String>;

pub const PARTITION_URL_KEY: &str = "url";
pub const OFFSET_KEY: &str = "offset";

pub fn partition_for_url(url: &str) -> SourcePartition {
    let mut p = HashMap::with_capacity(1);
    p.insert(PARTITION_URL_KEY.to_string(), url.to_string());
    p
}

pub fn offset_map(value: &str) -> SourceOffset {
    let mut o = HashMap::with_capacity(1);
    o.insert(OFFSET_KEY.to_string(), value.to_string());
    o
}

pub fn offset_value(offset: &SourceOffset) -> Option<&str> {
    offset.get(OFFSET_KEY).map(String::as_str)
}
