//! Metadata Store: read-mostly relational records behind the vector index.

pub mod model;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;

pub use model::{DocumentRecord, DocumentSummary, TypeCount, UNKNOWN_AUTHOR};
pub use sqlite::SqliteDocumentStore;

use crate::core::errors::ApiError;

/// Query-path view of the store. Implementations never write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>, ApiError>;

    /// Batch lookup; ids with no row are simply absent from the map.
    async fn get_documents(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DocumentRecord>, ApiError>;

    /// Case-insensitive substring match of any term against title, author,
    /// content, description and tags, in store iteration order.
    async fn lexical_search(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<DocumentRecord>, ApiError>;

    async fn list_documents(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentSummary>, ApiError>;

    /// Full records in store iteration order, for corpus-wide annotation.
    async fn scan_documents(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    async fn document_types(&self) -> Result<Vec<String>, ApiError>;

    /// Distinct non-zero years, newest first.
    async fn document_years(&self) -> Result<Vec<i32>, ApiError>;

    /// Distinct authors, sorted, without the unknown placeholder.
    async fn document_authors(&self) -> Result<Vec<String>, ApiError>;

    async fn counts_by_type(&self) -> Result<Vec<TypeCount>, ApiError>;
}
