use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::template;

pub const PARENT_VALUE_VAR: &str = "parent_value";
pub const PARENT_API_ID_VAR: &str = "parent_api_id";

/// Latest successful response of a parent endpoint. Overwritten wholesale on
/// each parent poll; children read it through an `Arc`, so a reader sees
/// either the previous snapshot or the next complete one.
#[derive(Debug)]
pub struct ParentSnapshot {
    pub raw_body: Value,
    pub records: Vec<Value>,
}

/// One-level parent/child dependency coordinator: gates child polls on the
/// parent having produced data, and exposes chaining template variables.
pub struct ChainingCoordinator {
    /// child endpoint id -> parent endpoint id
    relations: HashMap<String, String>,
    snapshots: RwLock<HashMap<String, Arc<ParentSnapshot>>>,
}

impl ChainingCoordinator {
    pub fn new(relations: HashMap<String, String>) -> Self {
        Self {
            relations,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn parent_of(&self, child_id: &str) -> Option<&str> {
        self.relations.get(child_id).map(String::as_str)
    }

    pub fn is_parent(&self, id: &str) -> bool {
        self.relations.values().any(|p| p == id)
    }

    /// A non-child endpoint is always ready; a child is ready once its parent
    /// has published at least one snapshot since task start.
    pub fn ready_for(&self, id: &str) -> bool {
        match self.relations.get(id) {
            None => true,
            Some(parent) => self
                .snapshots
                .read()
                .expect("Snapshot lock poisoned")
                .contains_key(parent),
        }
    }

    pub fn publish_parent(&self, parent_id: &str, raw_body: Value, records: Vec<Value>) {
        self.snapshots
            .write()
            .expect("Snapshot lock poisoned")
            .insert(parent_id.to_string(), Arc::new(ParentSnapshot { raw_body, records }));
    }

    pub fn clear(&self, parent_id: &str) {
        self.snapshots
            .write()
            .expect("Snapshot lock poisoned")
            .remove(parent_id);
    }

    pub fn snapshot(&self, parent_id: &str) -> Option<Arc<ParentSnapshot>> {
        self.snapshots
            .read()
            .expect("Snapshot lock poisoned")
            .get(parent_id)
            .cloned()
    }

    /// Chaining variables for a child's templates. The pointer is applied to
    /// the parent's raw body first, then to its most recent extracted record,
    /// so `/id` works against both `{"id": 42}` and `{"data": [{"id": 42}]}`
    /// shapes. Non-child endpoints get an empty map.
    pub fn variables_for(
        &self,
        child_id: &str,
        chaining_pointer: Option<&str>,
    ) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let parent_id = match self.relations.get(child_id) {
            Some(p) => p,
            None => return vars,
        };
        vars.insert(PARENT_API_ID_VAR.to_string(), parent_id.clone());

        let snapshot = match self.snapshot(parent_id) {
            Some(s) => s,
            None => return vars,
        };
        if let Some(ptr) = chaining_pointer {
            let value = template::pointer_as_string(&snapshot.raw_body, ptr).or_else(|| {
                snapshot
                    .records
                    .last()
                    .and_then(|record| template::pointer_as_string(record, ptr))
            });
            if let Some(v) = value {
                vars.insert(PARENT_VALUE_VAR.to_string(), v);
            }
        }
        vars
    }
}
