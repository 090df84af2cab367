//! Shared data models.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionConfig, DbType};
pub use query::{
    CountResponse, Operator, QueryKind, QueryRequest, Record, RecordRequest, RecordResponse,
    RecordsResponse, SearchRequest, SearchResponse, TableQueryRequest,
};
pub use schema::{
    ColumnDescriptor, ForeignKey, TableDescriptor, TableInfo, TablesResponse, TypeCategory,
};
