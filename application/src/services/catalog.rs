use crate::payload::{CREATED_AT_FIELD, reject_blocked, require_fields, timestamp, to_record};
use crate::{ApplicationError, RecordStore, ResourceInfo, ResourceService};
use async_trait::async_trait;
use domain::{Record, RecordId, SearchQuery};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The clinic's priced services (consultation, grooming, ...), referenced by appointments.
pub const CATALOG: ResourceInfo = ResourceInfo {
    collection: "services",
    singular: "service",
    fields: &["id", "name", "value", "description", "created_at"],
    required_on_create: &["name", "value", "description"],
    blocked_on_update: &["id", "created_at"],
};

pub struct CatalogService {
    services: Arc<dyn RecordStore>,
}

impl CatalogService {
    pub fn new(services: Arc<dyn RecordStore>) -> Self {
        Self { services }
    }

    fn ensure_numeric_value(service: &Record) -> Result<(), ApplicationError> {
        match service.get("value") {
            Some(value) if value.trim().parse::<f64>().is_err() => {
                warn!(%value, "Rejected non-numeric service value");
                Err(ApplicationError::InvalidInput(format!(
                    "The service value '{}' is not a number",
                    value
                )))
            }
            _ => Ok(()),
        }
    }

    fn views(services: Vec<Record>) -> Vec<Value> {
        services
            .iter()
            .map(|service| Value::Object(service.to_json_object()))
            .collect()
    }
}

#[async_trait]
impl ResourceService for CatalogService {
    fn info(&self) -> &'static ResourceInfo {
        &CATALOG
    }

    async fn list(&self) -> Result<Vec<Value>, ApplicationError> {
        Ok(Self::views(self.services.list_all().await?))
    }

    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError> {
        let service = self.services.get_by_id(id).await?;
        Ok(service.map(|s| Value::Object(s.to_json_object())))
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError> {
        require_fields(&payload, CATALOG.required_on_create)?;
        let mut service = to_record(&payload)?;
        Self::ensure_numeric_value(&service)?;
        service.set(CREATED_AT_FIELD, timestamp());
        let id = self.services.create(service).await?;
        info!(service_id = %id, "Service created");
        Ok(id)
    }

    #[instrument(skip(self, payload))]
    async fn update(
        &self,
        id: RecordId,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        reject_blocked(&payload, CATALOG.blocked_on_update)?;
        let partial = to_record(&payload)?;
        Self::ensure_numeric_value(&partial)?;
        self.services.update(id, partial).await?;
        info!(service_id = %id, "Service updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        self.services.delete(id).await?;
        info!(service_id = %id, "Service deleted");
        Ok(())
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError> {
        Ok(Self::views(self.services.search(&query).await?))
    }
}
