// Module declarations
pub mod persistence;

pub use persistence::{CsvRecordStore, TableError, TableRegistry};
