pub mod csv_store;
pub mod registry;

pub use csv_store::{CsvRecordStore, TableError};
pub use registry::TableRegistry;
