use crate::payload::{CREATED_AT_FIELD, reject_blocked, require_fields, timestamp, to_record};
use crate::{ApplicationError, RecordStore, ResourceInfo, ResourceService};
use async_trait::async_trait;
use domain::{Logic, Operator, Record, RecordId, SearchQuery};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

pub const CLIENTS: ResourceInfo = ResourceInfo {
    collection: "clients",
    singular: "client",
    fields: &["id", "name", "email", "phone", "created_at"],
    required_on_create: &["name", "phone", "email"],
    blocked_on_update: &["id", "created_at"],
};

/// Clients, each returned with the pets they own.
pub struct ClientService {
    clients: Arc<dyn RecordStore>,
    // Raw pets table; read-only.
    pets: Arc<dyn RecordStore>,
    // Held from the email check until the write lands.
    writes: Mutex<()>,
}

impl ClientService {
    pub fn new(clients: Arc<dyn RecordStore>, pets: Arc<dyn RecordStore>) -> Self {
        Self {
            clients,
            pets,
            writes: Mutex::new(()),
        }
    }

    async fn resolve(&self, clients: Vec<Record>) -> Result<Vec<Value>, ApplicationError> {
        if clients.is_empty() {
            return Ok(Vec::new());
        }
        let pets = self.pets.list_all().await?;
        let views = clients
            .into_iter()
            .map(|client| {
                let owned: Vec<Value> = pets
                    .iter()
                    .filter(|pet| client.id().is_some() && pet.get("owner_id") == client.id())
                    .map(|pet| Value::Object(pet.to_json_object()))
                    .collect();
                let mut view = client.to_json_object();
                view.insert("pets".to_string(), Value::Array(owned));
                Value::Object(view)
            })
            .collect();
        Ok(views)
    }

    /// Email addresses identify clients; `except` skips the client being edited.
    async fn ensure_email_free(
        &self,
        email: &str,
        except: Option<RecordId>,
    ) -> Result<(), ApplicationError> {
        let query = SearchQuery::new(Logic::And).with("email", Operator::Equal, email.trim());
        let except = except.map(|id| id.to_string());
        let taken = self
            .clients
            .search(&query)
            .await?
            .iter()
            .any(|client| client.id() != except.as_deref());
        if taken {
            warn!(%email, "Email already belongs to another client");
            return Err(ApplicationError::Conflict(format!(
                "The email '{}' is already in use",
                email
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceService for ClientService {
    fn info(&self) -> &'static ResourceInfo {
        &CLIENTS
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Value>, ApplicationError> {
        let clients = self.clients.list_all().await?;
        self.resolve(clients).await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError> {
        match self.clients.get_by_id(id).await? {
            Some(client) => Ok(self.resolve(vec![client]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError> {
        require_fields(&payload, CLIENTS.required_on_create)?;
        let mut client = to_record(&payload)?;
        let _writing = self.writes.lock().await;
        if let Some(email) = client.get("email") {
            self.ensure_email_free(email, None).await?;
        }
        client.set(CREATED_AT_FIELD, timestamp());
        let id = self.clients.create(client).await?;
        info!(client_id = %id, "Client created");
        Ok(id)
    }

    #[instrument(skip(self, payload))]
    async fn update(
        &self,
        id: RecordId,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        reject_blocked(&payload, CLIENTS.blocked_on_update)?;
        let partial = to_record(&payload)?;
        let _writing = self.writes.lock().await;
        if let Some(email) = partial.get("email") {
            self.ensure_email_free(email, Some(id)).await?;
        }
        self.clients.update(id, partial).await?;
        info!(client_id = %id, "Client updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        self.clients.delete(id).await?;
        info!(client_id = %id, "Client deleted");
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError> {
        let clients = self.clients.search(&query).await?;
        self.resolve(clients).await
    }
}
