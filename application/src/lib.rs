use async_trait::async_trait;
use domain::{DomainError, Record, RecordId, SearchQuery};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

pub mod filters;
pub mod payload;
pub mod services;

#[cfg(test)]
mod test_support;

pub use filters::query_from_params;
pub use services::{
    APPOINTMENTS, AppointmentService, CATALOG, CLIENTS, CatalogService, ClientService, EMPLOYEES,
    EmployeeService, PETS, PetService,
};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Record {id} not found in collection '{collection}'")]
    NotFound { collection: String, id: RecordId },
    #[error("Storage failure in collection '{collection}': {source}")]
    StorageError {
        collection: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Required fields are missing or empty: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Fields cannot be changed: {}", .0.join(", "))]
    BlockedFields(Vec<String>),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal failure: {0}")]
    Internal(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
}

impl ApplicationError {
    pub fn storage(
        collection: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ApplicationError::StorageError {
            collection: collection.to_string(),
            source: source.into(),
        }
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// Durable storage of one named table of records.
///
/// Implementations assign `id` themselves (`max + 1` over current rows) and must
/// serialize their read-modify-write cycles. Content validation is the
/// caller's job; `update` will even overwrite `id` if asked to.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Name of the collection (table) this store persists.
    fn collection(&self) -> &str;
    /// Every record, in table order.
    async fn list_all(&self) -> Result<Vec<Record>, ApplicationError>;
    /// First record whose `id` equals `id`. Absence is not an error.
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, ApplicationError>;
    /// Appends `fields` under a freshly assigned id and returns that id.
    async fn create(&self, fields: Record) -> Result<RecordId, ApplicationError>;
    /// Merges `partial` over an existing record. `NotFound` if absent.
    async fn update(&self, id: RecordId, partial: Record) -> Result<(), ApplicationError>;
    /// Removes a record. `NotFound` if absent.
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError>;
    /// Records matching `query`, in table order.
    #[instrument(skip(self, query))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Record>, ApplicationError> {
        let records = self.list_all().await?;
        let scanned = records.len();
        let matched = query.filter(records);
        debug!(
            collection = %self.collection(),
            criteria = query.criteria.len(),
            scanned,
            matched = matched.len(),
            "Search via full scan"
        );
        Ok(matched)
    }
}

// --- Resource Services ---

/// Static description of one API resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Table name, also the route prefix.
    pub collection: &'static str,
    /// Singular name used in error "points" (e.g. `delete_pet`).
    pub singular: &'static str,
    /// Persisted header, in order.
    pub fields: &'static [&'static str],
    pub required_on_create: &'static [&'static str],
    pub blocked_on_update: &'static [&'static str],
}

impl ResourceInfo {
    /// Operation tag reported with failures, e.g. `create_client`.
    pub fn point(&self, verb: &str) -> String {
        format!("{}_{}", verb, self.singular)
    }
}

/// Domain-level CRUD + search for one resource, with relationships resolved
/// into the returned JSON views.
#[async_trait]
pub trait ResourceService: Send + Sync {
    fn info(&self) -> &'static ResourceInfo;
    async fn list(&self) -> Result<Vec<Value>, ApplicationError>;
    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError>;
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError>;
    async fn update(&self, id: RecordId, payload: Map<String, Value>)
    -> Result<(), ApplicationError>;
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError>;
    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError>;
}
