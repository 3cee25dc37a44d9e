use super::csv_store::{CsvRecordStore, TableError};
use application::ResourceInfo;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Hands out the single shared store of each table under `data_dir`.
#[derive(Debug)]
pub struct TableRegistry {
    data_dir: PathBuf,
    // Table name -> its only store instance
    tables: DashMap<String, Arc<CsvRecordStore>>,
    // Held while a table file is being provisioned.
    opening: Mutex<()>,
}

impl TableRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tables: DashMap::new(),
            opening: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data_dir>/<collection>.csv`
    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", collection))
    }

    fn existing(&self, collection: &str) -> Option<Arc<CsvRecordStore>> {
        self.tables
            .get(collection)
            .map(|store| Arc::clone(store.value()))
    }

    /// Store for `collection`, opened (and provisioned with `header`) on first use.
    #[instrument(skip(self, header))]
    pub async fn open(
        &self,
        collection: &str,
        header: &[&str],
    ) -> Result<Arc<CsvRecordStore>, TableError> {
        if let Some(store) = self.existing(collection) {
            return Ok(store);
        }
        let _opening = self.opening.lock().await;
        // Another caller may have finished opening it while we waited.
        if let Some(store) = self.existing(collection) {
            return Ok(store);
        }
        let store = Arc::new(
            CsvRecordStore::open(collection, self.path_for(collection), header).await?,
        );
        self.tables.insert(collection.to_string(), Arc::clone(&store));
        info!(collection, path = %store.path().display(), "Table ready");
        Ok(store)
    }

    /// Store for a resource's table, provisioned with its declared fields.
    pub async fn open_resource(
        &self,
        info: &ResourceInfo,
    ) -> Result<Arc<CsvRecordStore>, TableError> {
        self.open(info.collection, info.fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::{
        ApplicationError, CLIENTS, ClientService, PETS, RecordStore, ResourceService,
    };
    use domain::Record;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn one_store_per_table() {
        let dir = TempDir::new().unwrap();
        let registry = TableRegistry::new(dir.path());
        let first = registry.open_resource(&CLIENTS).await.unwrap();
        let second = registry.open("clients", &[]).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let pets = registry.open("pets", &["name"]).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &pets));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_opens_share_one_store() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(TableRegistry::new(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.open_resource(&CLIENTS).await })
            })
            .collect();

        let mut stores = Vec::new();
        for handle in handles {
            stores.push(handle.await.unwrap().unwrap());
        }
        assert!(stores.iter().all(|store| Arc::ptr_eq(store, &stores[0])));
        let text = std::fs::read_to_string(registry.path_for("clients")).unwrap();
        assert_eq!(text, "id,name,email,phone,created_at\n");
    }

    #[tokio::test]
    async fn resource_tables_live_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let registry = TableRegistry::new(dir.path().join("instance"));
        let clients = registry.open_resource(&CLIENTS).await.unwrap();
        assert_eq!(clients.path(), dir.path().join("instance/clients.csv"));

        let fields: Record = [("name", "Ana")].into_iter().collect();
        clients.create(fields).await.unwrap();
        let text = std::fs::read_to_string(registry.path_for("clients")).unwrap();
        assert!(text.starts_with("id,name,email,phone,created_at\n1,Ana,"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn client_emails_stay_unique_under_parallel_creates() {
        let dir = TempDir::new().unwrap();
        let registry = TableRegistry::new(dir.path());
        let clients = registry.open_resource(&CLIENTS).await.unwrap();
        let pets = registry.open_resource(&PETS).await.unwrap();
        let service = Arc::new(ClientService::new(clients.clone(), pets));

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let payload = json!({"name": "Ana", "email": "ana@vet.io", "phone": n});
                    service.create(payload.as_object().cloned().unwrap()).await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, ApplicationError::Conflict(_))),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(clients.list_all().await.unwrap().len(), 1);
    }
}
