use crate::payload::{
    CREATED_AT_FIELD, reference, reject_blocked, require_fields, timestamp, to_record,
};
use crate::{ApplicationError, RecordStore, ResourceInfo, ResourceService};
use async_trait::async_trait;
use domain::{Record, RecordId, SearchQuery};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const PETS: ResourceInfo = ResourceInfo {
    collection: "pets",
    singular: "pet",
    fields: &["id", "name", "specie", "sex", "age", "owner_id", "created_at"],
    required_on_create: &["name", "specie", "sex", "owner_id", "age"],
    blocked_on_update: &["id", "created_at"],
};

const OWNER_FIELD: &str = "owner_id";

/// Pets, each returned with `owner_id` replaced by the owning client.
pub struct PetService {
    pets: Arc<dyn RecordStore>,
    // Raw clients table, never the client service: that one reads pets back.
    clients: Arc<dyn RecordStore>,
}

impl PetService {
    pub fn new(pets: Arc<dyn RecordStore>, clients: Arc<dyn RecordStore>) -> Self {
        Self { pets, clients }
    }

    async fn resolve(&self, pets: Vec<Record>) -> Result<Vec<Value>, ApplicationError> {
        let mut owners: HashMap<RecordId, Value> = HashMap::new();
        let mut views = Vec::with_capacity(pets.len());
        for pet in pets {
            let mut view = pet.to_json_object();
            let has_owner = pet.get(OWNER_FIELD).is_some_and(|owner| !owner.is_empty());
            if has_owner {
                let owner = match reference(&pet, OWNER_FIELD) {
                    Some(owner_id) => match owners.get(&owner_id) {
                        Some(cached) => cached.clone(),
                        None => {
                            let owner = self
                                .clients
                                .get_by_id(owner_id)
                                .await?
                                .map_or(Value::Null, |client| {
                                    Value::Object(client.to_json_object())
                                });
                            owners.insert(owner_id, owner.clone());
                            owner
                        }
                    },
                    None => Value::Null,
                };
                view.insert(OWNER_FIELD.to_string(), owner);
            }
            views.push(Value::Object(view));
        }
        debug!(pets = views.len(), owners = owners.len(), "Resolved pet owners");
        Ok(views)
    }

    /// `sex` must be M or F in any case; stored upper-case.
    fn normalize_sex(pet: &mut Record) -> Result<(), ApplicationError> {
        let Some(sex) = pet.get("sex").map(|s| s.trim().to_uppercase()) else {
            return Ok(());
        };
        if sex != "M" && sex != "F" {
            warn!(%sex, "Rejected pet sex");
            return Err(ApplicationError::InvalidInput(
                "The 'sex' field must be 'M' (male) or 'F' (female).".to_string(),
            ));
        }
        pet.set("sex", sex);
        Ok(())
    }

    async fn ensure_owner_exists(&self, pet: &Record) -> Result<(), ApplicationError> {
        let Some(raw) = pet.get(OWNER_FIELD) else {
            return Ok(());
        };
        let owner = match reference(pet, OWNER_FIELD) {
            Some(owner_id) => self.clients.get_by_id(owner_id).await?,
            None => None,
        };
        if owner.is_none() {
            warn!(owner_id = %raw, "Pet owner does not exist");
            return Err(ApplicationError::InvalidInput(format!(
                "Client '{}' does not exist",
                raw
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceService for PetService {
    fn info(&self) -> &'static ResourceInfo {
        &PETS
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Value>, ApplicationError> {
        let pets = self.pets.list_all().await?;
        self.resolve(pets).await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: RecordId) -> Result<Option<Value>, ApplicationError> {
        match self.pets.get_by_id(id).await? {
            Some(pet) => Ok(self.resolve(vec![pet]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, payload))]
    async fn create(&self, payload: Map<String, Value>) -> Result<RecordId, ApplicationError> {
        require_fields(&payload, PETS.required_on_create)?;
        let mut pet = to_record(&payload)?;
        Self::normalize_sex(&mut pet)?;
        self.ensure_owner_exists(&pet).await?;
        pet.set(CREATED_AT_FIELD, timestamp());
        let id = self.pets.create(pet).await?;
        info!(pet_id = %id, "Pet created");
        Ok(id)
    }

    #[instrument(skip(self, payload))]
    async fn update(
        &self,
        id: RecordId,
        payload: Map<String, Value>,
    ) -> Result<(), ApplicationError> {
        reject_blocked(&payload, PETS.blocked_on_update)?;
        let mut partial = to_record(&payload)?;
        Self::normalize_sex(&mut partial)?;
        self.ensure_owner_exists(&partial).await?;
        self.pets.update(id, partial).await?;
        info!(pet_id = %id, "Pet updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        self.pets.delete(id).await?;
        info!(pet_id = %id, "Pet deleted");
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(&self, query: SearchQuery) -> Result<Vec<Value>, ApplicationError> {
        let pets = self.pets.search(&query).await?;
        self.resolve(pets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CLIENTS;
    use crate::test_support::MemoryStore;
    use domain::Operator;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn service_with_owner() -> (PetService, Arc<MemoryStore>) {
        let pets = MemoryStore::for_resource(&PETS);
        let clients = MemoryStore::for_resource(&CLIENTS);
        clients
            .create([("name", "Ana"), ("email", "a@v.io")].into_iter().collect())
            .await
            .unwrap();
        (PetService::new(pets.clone(), clients), pets)
    }

    fn rex() -> Map<String, Value> {
        object(json!({"name": "Rex", "specie": "dog", "sex": "m", "age": 5, "owner_id": 1}))
    }

    #[tokio::test]
    async fn create_normalizes_sex_and_stores_text() {
        let (service, store) = service_with_owner().await;
        service.create(rex()).await.unwrap();
        let stored = &store.records()[0];
        assert_eq!(stored.get("sex"), Some("M"));
        assert_eq!(stored.get("age"), Some("5"));
        assert_eq!(stored.get("owner_id"), Some("1"));
    }

    #[tokio::test]
    async fn invalid_sex_is_rejected() {
        let (service, store) = service_with_owner().await;
        let mut payload = rex();
        payload.insert("sex".into(), json!("x"));
        let err = service.create(payload).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(_)));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn unknown_owner_is_rejected() {
        let (service, _) = service_with_owner().await;
        let mut payload = rex();
        payload.insert("owner_id".into(), json!(7));
        let err = service.create(payload).await.unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidInput(msg) if msg.contains("'7'")));
    }

    #[tokio::test]
    async fn owner_id_is_replaced_by_the_client() {
        let (service, _) = service_with_owner().await;
        let id = service.create(rex()).await.unwrap();
        let pet = service.get(id).await.unwrap().unwrap();
        assert_eq!(pet["owner_id"]["name"], "Ana");
        assert_eq!(pet["owner_id"]["id"], "1");
    }

    #[tokio::test]
    async fn dangling_owner_resolves_to_null() {
        let (service, store) = service_with_owner().await;
        store
            .create([("name", "Stray"), ("owner_id", "99")].into_iter().collect())
            .await
            .unwrap();
        store
            .create([("name", "Nobody"), ("owner_id", "")].into_iter().collect())
            .await
            .unwrap();
        let pets = service.list().await.unwrap();
        assert_eq!(pets[0]["owner_id"], Value::Null);
        assert_eq!(pets[1]["owner_id"], "");
    }

    #[tokio::test]
    async fn search_by_age_returns_resolved_pets() {
        let (service, _) = service_with_owner().await;
        service.create(rex()).await.unwrap();
        let mut fido = rex();
        fido.insert("name".into(), json!("Fido"));
        fido.insert("age".into(), json!(9));
        service.create(fido).await.unwrap();

        let found = service
            .search(SearchQuery::default().with("age", Operator::MoreThan, "6"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "Fido");
        assert_eq!(found[0]["owner_id"]["name"], "Ana");
    }

    #[tokio::test]
    async fn empty_update_changes_nothing() {
        let (service, store) = service_with_owner().await;
        let id = service.create(rex()).await.unwrap();
        let before = store.records();
        service.update(id, Map::new()).await.unwrap();
        assert_eq!(store.records(), before);
    }
}
