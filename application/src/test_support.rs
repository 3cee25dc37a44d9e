use crate::{ApplicationError, RecordStore, ResourceInfo};
use async_trait::async_trait;
use domain::{Record, RecordId, Table};
use std::sync::{Arc, Mutex};

/// Table kept in memory, for exercising services without touching disk.
pub struct MemoryStore {
    collection: String,
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn for_resource(info: &ResourceInfo) -> Arc<Self> {
        Arc::new(Self {
            collection: info.collection.to_string(),
            table: Mutex::new(Table::new(info.fields.iter().copied())),
        })
    }

    pub fn records(&self) -> Vec<Record> {
        self.table.lock().unwrap().records().to_vec()
    }

    fn not_found(&self, id: RecordId) -> ApplicationError {
        ApplicationError::NotFound {
            collection: self.collection.clone(),
            id,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn list_all(&self) -> Result<Vec<Record>, ApplicationError> {
        Ok(self.records())
    }

    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, ApplicationError> {
        Ok(self.table.lock().unwrap().find(id).cloned())
    }

    async fn create(&self, fields: Record) -> Result<RecordId, ApplicationError> {
        Ok(self.table.lock().unwrap().insert(fields)?)
    }

    async fn update(&self, id: RecordId, partial: Record) -> Result<(), ApplicationError> {
        if self.table.lock().unwrap().merge(id, &partial) {
            Ok(())
        } else {
            Err(self.not_found(id))
        }
    }

    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        if self.table.lock().unwrap().remove(id) {
            Ok(())
        } else {
            Err(self.not_found(id))
        }
    }
}
