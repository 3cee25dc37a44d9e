use crate::payload::{
    CREATED_AT_FIELD, reject_blocked, require_fields, timestamp, to_record, view_without,
};
use crate::{ApplicationError, RecordStore, ResourceInfo, ResourceService};
use argon2::Argon2;
use argon2::password_hash::{self, PasswordHasher, SaltString};
use async_trait::async_trait;
use domain::{Record, RecordId, SearchQuery};
use rand::rngs::OsRng;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const EMPLOYEES: ResourceInfo = ResourceInfo {
    collection: "employees",
    singular: "employee",
    fields: &["id", "name", "email", "job_title", "password", "created_at"],
    required_on_create: &["name", "job_title", "email", "password"],
    blocked_on_update: &["id", "created_at"],
};

pub(crate) const PASSWORD_FIELD: &str = "password";

/// Employee view as exposed to callers: never carries the password hash.
pub(crate) fn employee_view(employee: &Record) -> Value {
    Value::Object(view_without(employee, &[PASSWORD_FIELD]))
}

/// Hashing failures are server faults, not bad input.
fn hashing_failure(e: password_hash::Error) -> ApplicationError {
    error!("Password hashing failed: {}", e);
    ApplicationError::Internal(format!("Password could not be hashed: {}", e))
}

pub struct EmployeeService {
    employees: Arc<dyn RecordStore>,
}

impl EmployeeService {
    pub fn new(employees: Arc<dyn RecordStore>) -> Self {
        Self { employees }
    }

    /// Replaces a plain-text password with its argon2 PHC string.
    fn hash_password(employee: &mut Record) -> Result<(), ApplicationError> {
        let Some(password) = employee.get(PASSWORD_FIELD) else {
            return Ok(());
        };
        if password.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "The password cannot be empty".to_string(),
            ));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(hashing_failure)?
            .to_string();
        employee.set(PASSWORD_FIELD, hash);
        Ok(())
    }
}

#[async_trait]
impl ResourceService for EmployeeService {
    fn info(&self) -> &'static ResourceInfo {
        &EMPLOYEES
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Value>, ApplicationError> {
        let employees = self.employees.list_all().await?;
        Ok(employees.iter().map(employee_view).collect())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError> {
        Ok(self.employees.get_by_id(id).await?.as_ref().map(employee_view))
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError> {
        require_fields(&payload, EMPLOYEES.required_on_create)?;
        let mut employee = to_record(&payload)?;
        Self::hash_password(&mut employee)?;
        employee.set(CREATED_AT_FIELD, timestamp());
        let id = self.employees.create(employee).await?;
        info!(employee_id = %id, "Employee created");
        Ok(id)
    }

    #[instrument(skip(self, payload))]
    async fn update(
        &self,
        id: RecordId,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        reject_blocked(&payload, EMPLOYEES.blocked_on_update)?;
        let mut partial = to_record(&payload)?;
        Self::hash_password(&mut partial)?;
        self.employees.update(id, partial).await?;
        info!(employee_id = %id, "Employee updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        self.employees.delete(id).await?;
        info!(employee_id = %id, "Employee deleted");
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError> {
        if query.references(PASSWORD_FIELD) {
            warn!("Rejected search on password hashes");
            return Err(ApplicationError::InvalidInput(
                "Employees cannot be searched by password".to_string(),
            ));
        }
        let employees = self.employees.search(&query).await?;
        Ok(employees.iter().map(employee_view).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use domain::Operator;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn service() -> (EmployeeService, Arc<MemoryStore>) {
        let store = MemoryStore::for_resource(&EMPLOYEES);
        (EmployeeService::new(store.clone()), store)
    }

    fn carla() -> Map<String, Value> {
        object(json!({
            "name": "Carla",
            "email": "c@vet.io",
            "job_title": "Vet",
            "password": "s3cret"
        }))
    }

    #[tokio::test]
    async fn password_is_stored_hashed_and_never_returned() {
        let (service, store) = service();
        let id = service.create(carla()).await.unwrap();

        let stored = store.records()[0].get("password").unwrap().to_string();
        assert!(stored.starts_with("$argon2"));
        assert_ne!(stored, "s3cret");

        let employee = service.get(id).await.unwrap().unwrap();
        assert!(employee.get("password").is_none());
        assert_eq!(employee["job_title"], "Vet");
        assert!(service.list().await.unwrap()[0].get("password").is_none());
    }

    #[tokio::test]
    async fn password_change_is_rehashed() {
        let (service, store) = service();
        let id = service.create(carla()).await.unwrap();
        let first = store.records()[0].get("password").unwrap().to_string();
        service
            .update(id, object(json!({"password": "another"})))
            .await
            .unwrap();
        let second = store.records()[0].get("password").unwrap().to_string();
        assert_ne!(first, second);
        assert!(second.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn searching_by_password_is_refused() {
        let (service, _) = service();
        let err = service
            .search(SearchQuery::default().with("password", Operator::Contains, "$"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(_)));
    }

    #[test]
    fn hashing_failures_are_internal_errors() {
        let err = hashing_failure(password_hash::Error::Password);
        assert!(matches!(err, ApplicationError::Internal(_)));
    }

    #[tokio::test]
    async fn update_of_missing_employee_is_not_found() {
        let (service, _) = service();
        let err = service
            .update(RecordId::new(3), object(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }
}
