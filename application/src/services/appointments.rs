use super::employees::employee_view;
use crate::payload::{
    CREATED_AT_FIELD, reference, reject_blocked, require_fields, timestamp, to_record,
};
use crate::{ApplicationError, RecordStore, ResourceInfo, ResourceService};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use domain::{Record, RecordId, SearchQuery};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const APPOINTMENTS: ResourceInfo = ResourceInfo {
    collection: "appointments",
    singular: "appointment",
    fields: &[
        "id",
        "pet_id",
        "service_id",
        "employee_id",
        "scheduled_at",
        "status",
        "created_at",
    ],
    required_on_create: &["pet_id", "service_id", "employee_id", "scheduled_at"],
    blocked_on_update: &["id", "pet_id", "created_at"],
};

pub const STATUSES: [&str; 3] = ["scheduled", "finished", "canceled"];
const DEFAULT_STATUS: &str = "scheduled";

/// Which related table a foreign key points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Pet,
    Service,
    Employee,
}

impl Relation {
    const ALL: [Relation; 3] = [Relation::Pet, Relation::Service, Relation::Employee];

    /// Key of the embedded object, also accepted as a search key (by name).
    fn key(self) -> &'static str {
        match self {
            Relation::Pet => "pet",
            Relation::Service => "service",
            Relation::Employee => "employee",
        }
    }

    fn id_field(self) -> &'static str {
        match self {
            Relation::Pet => "pet_id",
            Relation::Service => "service_id",
            Relation::Employee => "employee_id",
        }
    }
}

/// Related tables loaded once per request, keyed by raw id text.
struct Related {
    tables: HashMap<&'static str, HashMap<String, Record>>,
}

impl Related {
    fn lookup(&self, relation: Relation, appointment: &Record) -> Option<&Record> {
        let id = appointment.get(relation.id_field())?;
        self.tables.get(relation.key())?.get(id)
    }

    fn embed(&self, relation: Relation, appointment: &Record) -> Value {
        match (relation, self.lookup(relation, appointment)) {
            (_, None) => Value::Null,
            (Relation::Employee, Some(employee)) => employee_view(employee),
            (_, Some(record)) => Value::Object(record.to_json_object()),
        }
    }
}

/// Appointments, each returned with its pet, service and employee embedded.
pub struct AppointmentService {
    appointments: Arc<dyn RecordStore>,
    // Raw related tables; read-only.
    pets: Arc<dyn RecordStore>,
    services: Arc<dyn RecordStore>,
    employees: Arc<dyn RecordStore>,
}

impl AppointmentService {
    pub fn new(
        appointments: Arc<dyn RecordStore>,
        pets: Arc<dyn RecordStore>,
        services: Arc<dyn RecordStore>,
        employees: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            appointments,
            pets,
            services,
            employees,
        }
    }

    fn store_for(&self, relation: Relation) -> &Arc<dyn RecordStore> {
        match relation {
            Relation::Pet => &self.pets,
            Relation::Service => &self.services,
            Relation::Employee => &self.employees,
        }
    }

    async fn load_related(&self) -> Result<Related, ApplicationError> {
        let mut tables = HashMap::new();
        for relation in Relation::ALL {
            let records = self.store_for(relation).list_all().await?;
            let by_id = records
                .into_iter()
                .filter_map(|record| Some((record.id()?.to_string(), record)))
                .collect();
            tables.insert(relation.key(), by_id);
        }
        Ok(Related { tables })
    }

    async fn resolve(&self, appointments: Vec<Record>) -> Result<Vec<Value>, ApplicationError> {
        if appointments.is_empty() {
            return Ok(Vec::new());
        }
        let related = self.load_related().await?;
        Ok(appointments
            .iter()
            .map(|appointment| Self::view(appointment, &related))
            .collect())
    }

    fn view(appointment: &Record, related: &Related) -> Value {
        let mut view = appointment.to_json_object();
        for relation in Relation::ALL {
            view.insert(relation.key().to_string(), related.embed(relation, appointment));
        }
        Value::Object(view)
    }

    /// Every foreign key present in `appointment` must point at an existing record.
    async fn ensure_references_exist(&self, appointment: &Record) -> Result<(), ApplicationError> {
        for relation in Relation::ALL {
            let Some(raw) = appointment.get(relation.id_field()) else {
                continue;
            };
            let found = match reference(appointment, relation.id_field()) {
                Some(id) => self.store_for(relation).get_by_id(id).await?.is_some(),
                None => false,
            };
            if !found {
                warn!(
                    field = relation.id_field(),
                    value = %raw,
                    "Appointment references a missing record"
                );
                return Err(ApplicationError::InvalidInput(format!(
                    "No {} with id '{}'",
                    relation.key(),
                    raw
                )));
            }
        }
        Ok(())
    }

    fn validate_schedule(appointment: &Record) -> Result<(), ApplicationError> {
        match appointment.get("scheduled_at") {
            Some(when) if !is_iso_datetime(when) => Err(ApplicationError::InvalidInput(format!(
                "'{}' is not an ISO 8601 date-time",
                when
            ))),
            _ => Ok(()),
        }
    }

    fn validate_status(appointment: &Record) -> Result<(), ApplicationError> {
        match appointment.get("status") {
            Some(status) if !STATUSES.contains(&status) => {
                Err(ApplicationError::InvalidInput(format!(
                    "Status must be one of: {}",
                    STATUSES.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }

    /// Search that may test related names (`pet`, `service`, `employee`).
    async fn search_with_relations(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Value>, ApplicationError> {
        let appointments = self.appointments.list_all().await?;
        if appointments.is_empty() {
            return Ok(Vec::new());
        }
        let related = self.load_related().await?;
        let views: Vec<Value> = appointments
            .iter()
            .filter(|appointment| {
                let mut searchable = (*appointment).clone();
                for relation in Relation::ALL {
                    let name = related
                        .lookup(relation, appointment)
                        .and_then(|record| record.get("name"))
                        .unwrap_or_default();
                    searchable.set(relation.key(), name);
                }
                query.matches(&searchable)
            })
            .map(|appointment| Self::view(appointment, &related))
            .collect();
        debug!(matched = views.len(), "Searched appointments by related names");
        Ok(views)
    }
}

/// Accepts `2025-12-18T10:36:13.226`, `2025-12-18T10:36`, RFC 3339 and plain dates.
fn is_iso_datetime(text: &str) -> bool {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

#[async_trait]
impl ResourceService for AppointmentService {
    fn info(&self) -> &'static ResourceInfo {
        &APPOINTMENTS
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Value>, ApplicationError> {
        let appointments = self.appointments.list_all().await?;
        self.resolve(appointments).await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError> {
        match self.appointments.get_by_id(id).await? {
            Some(appointment) => Ok(self.resolve(vec![appointment]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError> {
        require_fields(&payload, APPOINTMENTS.required_on_create)?;
        let mut appointment = to_record(&payload)?;
        if appointment.get("status").is_none_or(str::is_empty) {
            appointment.set("status", DEFAULT_STATUS);
        }
        Self::validate_schedule(&appointment)?;
        Self::validate_status(&appointment)?;
        self.ensure_references_exist(&appointment).await?;
        appointment.set(CREATED_AT_FIELD, timestamp());
        let id = self.appointments.create(appointment).await?;
        info!(appointment_id = %id, "Appointment created");
        Ok(id)
    }

    #[instrument(skip(self, payload))]
    async fn update(
        &self,
        id: RecordId,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        reject_blocked(&payload, APPOINTMENTS.blocked_on_update)?;
        let mut partial = to_record(&payload)?;
        // A blank status leaves the current one in place.
        if partial.get("status").is_some_and(|status| status.trim().is_empty()) {
            partial.remove("status");
        }
        Self::validate_schedule(&partial)?;
        Self::validate_status(&partial)?;
        self.ensure_references_exist(&partial).await?;
        self.appointments.update(id, partial).await?;
        info!(appointment_id = %id, "Appointment updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        self.appointments.delete(id).await?;
        info!(appointment_id = %id, "Appointment deleted");
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError> {
        if Relation::ALL.iter().any(|relation| query.references(relation.key())) {
            return self.search_with_relations(&query).await;
        }
        let appointments = self.appointments.search(&query).await?;
        self.resolve(appointments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CATALOG, EMPLOYEES, PETS};
    use crate::test_support::MemoryStore;
    use domain::{Logic, Operator};
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().copied().collect()
    }

    async fn fixture() -> (AppointmentService, Arc<MemoryStore>) {
        let appointments = MemoryStore::for_resource(&APPOINTMENTS);
        let pets = MemoryStore::for_resource(&PETS);
        let services = MemoryStore::for_resource(&CATALOG);
        let employees = MemoryStore::for_resource(&EMPLOYEES);
        pets.create(record(&[("name", "Rex"), ("owner_id", "1")])).await.unwrap();
        pets.create(record(&[("name", "Biruta"), ("owner_id", "1")])).await.unwrap();
        services.create(record(&[("name", "Bath"), ("value", "40")])).await.unwrap();
        employees
            .create(record(&[("name", "Carla"), ("password", "$argon2id$x")]))
            .await
            .unwrap();
        let service = AppointmentService::new(appointments.clone(), pets, services, employees);
        (service, appointments)
    }

    fn booking(pet_id: u64) -> Map<String, Value> {
        object(json!({
            "pet_id": pet_id,
            "service_id": 1,
            "employee_id": 1,
            "scheduled_at": "2025-12-18T10:36:13.226"
        }))
    }

    #[tokio::test]
    async fn create_defaults_status_to_scheduled() {
        let (service, store) = fixture().await;
        service.create(booking(1)).await.unwrap();
        assert_eq!(store.records()[0].get("status"), Some("scheduled"));
    }

    #[tokio::test]
    async fn create_rejects_missing_references() {
        let (service, store) = fixture().await;
        let err = service.create(booking(9)).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(msg) if msg.contains("pet")));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_malformed_schedule() {
        let (service, _) = fixture().await;
        let mut payload = booking(1);
        payload.insert("scheduled_at".into(), json!("tomorrow"));
        let err = service.create(payload).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_validates_status_and_blocks_pet() {
        let (service, _) = fixture().await;
        let id = service.create(booking(1)).await.unwrap();
        let err = service
            .update(id, object(json!({"status": "lost"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(_)));

        let err = service
            .update(id, object(json!({"pet_id": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::BlockedFields(f) if f == vec!["pet_id"]));

        service
            .update(id, object(json!({"status": "finished"})))
            .await
            .unwrap();
        let appointment = service.get(id).await.unwrap().unwrap();
        assert_eq!(appointment["status"], "finished");
    }

    #[tokio::test]
    async fn blank_status_on_update_keeps_the_current_one() {
        let (service, store) = fixture().await;
        let id = service.create(booking(1)).await.unwrap();
        service
            .update(id, object(json!({"status": "", "scheduled_at": "2025-12-19T09:00"})))
            .await
            .unwrap();
        let stored = &store.records()[0];
        assert_eq!(stored.get("status"), Some("scheduled"));
        assert_eq!(stored.get("scheduled_at"), Some("2025-12-19T09:00"));
    }

    #[tokio::test]
    async fn relations_are_embedded_without_password() {
        let (service, _) = fixture().await;
        let id = service.create(booking(2)).await.unwrap();
        let appointment = service.get(id).await.unwrap().unwrap();
        assert_eq!(appointment["pet"]["name"], "Biruta");
        assert_eq!(appointment["service"]["name"], "Bath");
        assert_eq!(appointment["employee"]["name"], "Carla");
        assert!(appointment["employee"].get("password").is_none());
        assert_eq!(appointment["pet_id"], "2");
    }

    #[tokio::test]
    async fn search_by_related_pet_name() {
        let (service, _) = fixture().await;
        service.create(booking(1)).await.unwrap();
        service.create(booking(2)).await.unwrap();

        let found = service
            .search(SearchQuery::default().with("pet", Operator::Contains, "bir"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["pet"]["name"], "Biruta");
    }

    #[tokio::test]
    async fn search_mixing_raw_and_related_keys() {
        let (service, _) = fixture().await;
        let first = service.create(booking(1)).await.unwrap();
        service.create(booking(2)).await.unwrap();
        service
            .update(first, object(json!({"status": "canceled"})))
            .await
            .unwrap();

        let query = SearchQuery::new(Logic::Or)
            .with("status", Operator::Equal, "canceled")
            .with("pet", Operator::Equal, "biruta");
        assert_eq!(service.search(query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn plain_search_uses_raw_fields() {
        let (service, _) = fixture().await;
        service.create(booking(1)).await.unwrap();
        let found = service
            .search(SearchQuery::default().with("employee_id", Operator::Equal, "1"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["employee"]["name"], "Carla");
    }

    #[test]
    fn iso_formats() {
        assert!(is_iso_datetime("2025-12-18T10:36:13.226"));
        assert!(is_iso_datetime("2025-12-18T10:36:13Z"));
        assert!(is_iso_datetime("2025-12-18T10:36"));
        assert!(is_iso_datetime("2025-12-18"));
        assert!(!is_iso_datetime("18/12/2025"));
    }
}
