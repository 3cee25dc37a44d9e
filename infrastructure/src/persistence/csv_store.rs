use application::{ApplicationError, RecordStore};
use async_trait::async_trait;
use domain::{DomainError, Record, RecordId, Table};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

// --- Table Errors ---

#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid table contents: {0}")]
    Domain(#[from] DomainError),
}

// --- Codec ---

/// Parses a whole table file: the first line is the header, every other
/// line one record.
fn decode(bytes: &[u8]) -> Result<Table, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut lines = reader.records();
    let header: Vec<String> = match lines.next() {
        Some(line) => line?.iter().map(str::to_string).collect(),
        None => Vec::new(),
    };
    let rows = lines
        .map(|line| line.map(|fields| fields.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok(Table::from_rows(header, rows)?)
}

fn encode(table: &Table) -> Result<Vec<u8>, TableError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    if !table.header().is_empty() {
        writer.write_record(table.header())?;
    }
    for row in table.rows() {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| TableError::Io(e.into_error()))
}

// --- Store ---

/// One table persisted as a CSV file.
///
/// Every operation reads the whole file and every mutation rewrites it,
/// all under one async mutex so concurrent read-modify-write cycles on the
/// same table cannot interleave. Only one instance may exist per file; get
/// it through [`TableRegistry`](super::TableRegistry).
#[derive(Debug)]
pub struct CsvRecordStore {
    collection: String,
    path: PathBuf,
    // Header used while the file is missing or empty.
    header: Vec<String>,
    lock: Mutex<()>,
}

impl CsvRecordStore {
    /// Opens the table at `path`, creating it with only `header` when missing.
    pub async fn open(
        collection: impl Into<String>,
        path: impl Into<PathBuf>,
        header: &[&str],
    ) -> Result<Self, TableError> {
        let store = Self {
            collection: collection.into(),
            path: path.into(),
            header: Table::new(header.iter().copied()).header().to_vec(),
            lock: Mutex::new(()),
        };
        if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if !store.header.is_empty() && !fs::try_exists(&store.path).await? {
            debug!(
                collection = %store.collection,
                path = %store.path.display(),
                "Creating table file"
            );
            store.persist(&store.empty_table()).await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn empty_table(&self) -> Table {
        Table::new(self.header.iter().cloned())
    }

    async fn load(&self) -> Result<Table, TableError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(self.empty_table()),
            Err(e) => return Err(e.into()),
        };
        let table = decode(&bytes)?;
        if table.header().is_empty() {
            return Ok(self.empty_table());
        }
        debug!(collection = %self.collection, records = table.len(), "Loaded table");
        Ok(table)
    }

    /// Writes a sibling temp file, then renames it over the table.
    async fn persist(&self, table: &Table) -> Result<(), TableError> {
        let bytes = encode(table)?;
        let staging = self.path.with_extension("csv.tmp");
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &self.path).await?;
        debug!(collection = %self.collection, records = table.len(), "Persisted table");
        Ok(())
    }

    fn storage_error(&self, e: TableError) -> ApplicationError {
        error!(
            collection = %self.collection,
            path = %self.path.display(),
            "Table storage failure: {}", e
        );
        ApplicationError::storage(&self.collection, e)
    }

    fn not_found(&self, id: RecordId) -> ApplicationError {
        ApplicationError::NotFound {
            collection: self.collection.clone(),
            id,
        }
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn list_all(&self) -> Result<Vec<Record>, ApplicationError> {
        let _guard = self.lock.lock().await;
        let table = self.load().await.map_err(|e| self.storage_error(e))?;
        Ok(table.into_records())
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>, ApplicationError> {
        let _guard = self.lock.lock().await;
        let table = self.load().await.map_err(|e| self.storage_error(e))?;
        Ok(table.find(id).cloned())
    }

    #[instrument(skip(self, fields), fields(collection = %self.collection))]
    async fn create(&self, fields: Record) -> Result<RecordId, ApplicationError> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await.map_err(|e| self.storage_error(e))?;
        let id = table
            .insert(fields)
            .map_err(|e| self.storage_error(e.into()))?;
        self.persist(&table)
            .await
            .map_err(|e| self.storage_error(e))?;
        debug!(record_id = %id, "Record appended");
        Ok(id)
    }

    #[instrument(skip(self, partial), fields(collection = %self.collection))]
    async fn update(&self, id: RecordId, partial: Record) -> Result<(), ApplicationError> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await.map_err(|e| self.storage_error(e))?;
        if !table.merge(id, &partial) {
            return Err(self.not_found(id));
        }
        self.persist(&table)
            .await
            .map_err(|e| self.storage_error(e))?;
        debug!(record_id = %id, fields = partial.len(), "Record merged");
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn delete(&self, id: RecordId) -> Result<(), ApplicationError> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await.map_err(|e| self.storage_error(e))?;
        if !table.remove(id) {
            return Err(self.not_found(id));
        }
        self.persist(&table)
            .await
            .map_err(|e| self.storage_error(e))?;
        debug!(record_id = %id, "Record removed");
        Ok(())
    }
}
