pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    ColumnMapping, ColumnMappings, DestinationColumn, RelationshipMapping, SyncDirection,
    SyncErrorRecord, SyncErrorType, SyncLog, SyncStatus, TableMapping,
};
pub use self::stores::{MappingStore, RecordStore, RelationshipStore, SyncErrorStore, SyncLogStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod postgres;
pub mod schema;
pub mod sql;
pub mod stores;

#[cfg(test)]
pub mod testing;
