//! SQLite-backed Metadata Store.
//!
//! The query path opens the database read-only; `create` is reserved for the
//! ingestion side and test fixtures.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::model::{DocumentRecord, DocumentSummary, TypeCount, UNKNOWN_AUTHOR};
use super::DocumentStore;
use crate::core::errors::ApiError;

const COLUMNS: &str = "id, title, author, year, source_type, description, content_preview, \
                       content, source_reference, url, word_count, tags";

const SUMMARY_COLUMNS: &str = "id, title, author, year, source_type, description, url, \
                               word_count, tags";

const LEXICAL_COLUMNS: [&str; 5] = ["title", "author", "content", "description", "tags"];

/// Upper bound on OR-ed terms so the bind count stays far below SQLite's limit.
const MAX_LEXICAL_TERMS: usize = 32;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    /// Opens an existing store for the query path. Never creates the file.
    pub async fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if !db_path.exists() {
            return Err(ApiError::NotFound(format!(
                "metadata store {} does not exist",
                db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.count().await?;
        Ok(store)
    }

    /// Creates (or reopens) a writable store and ensures the schema exists.
    pub async fn create(db_path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT 'Unknown',
                year INTEGER NOT NULL DEFAULT 0,
                source_type TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                content_preview TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                source_reference TEXT NOT NULL DEFAULT '',
                url TEXT,
                word_count INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                import_date TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(source_type)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Inserts one record. Duplicate ids are rejected.
    pub async fn insert_document(&self, record: &DocumentRecord) -> Result<(), ApiError> {
        self.insert_batch(std::slice::from_ref(record)).await
    }

    pub async fn insert_batch(&self, records: &[DocumentRecord]) -> Result<(), ApiError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for record in records {
            let tags = serde_json::to_string(&record.tags).map_err(ApiError::internal)?;
            sqlx::query(
                "INSERT INTO documents (id, title, author, year, source_type, description,
                    content_preview, content, source_reference, url, word_count, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.author)
            .bind(record.year.unwrap_or(0))
            .bind(&record.doc_type)
            .bind(&record.description)
            .bind(&record.content_preview)
            .bind(&record.content)
            .bind(&record.source_reference)
            .bind(&record.url)
            .bind(i64::from(record.word_count))
            .bind(&tags)
            .execute(&mut *tx)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    ApiError::BadRequest(format!("document '{}' already exists", record.id))
                }
                _ => ApiError::internal(err),
            })?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    fn row_to_document(row: &SqliteRow) -> Result<DocumentRecord, sqlx::Error> {
        Ok(DocumentRecord {
            id: row.try_get("id")?,
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            author: normalize_author(row.try_get("author")?),
            year: normalize_year(row.try_get("year")?),
            doc_type: row
                .try_get::<Option<String>, _>("source_type")?
                .unwrap_or_default(),
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
            content_preview: row
                .try_get::<Option<String>, _>("content_preview")?
                .unwrap_or_default(),
            content: row.try_get::<Option<String>, _>("content")?.unwrap_or_default(),
            source_reference: row
                .try_get::<Option<String>, _>("source_reference")?
                .unwrap_or_default(),
            url: row
                .try_get::<Option<String>, _>("url")?
                .filter(|u| !u.trim().is_empty()),
            word_count: normalize_word_count(row.try_get("word_count")?),
            tags: decode_tags(row.try_get("tags")?),
        })
    }

    fn row_to_summary(row: &SqliteRow) -> Result<DocumentSummary, sqlx::Error> {
        Ok(DocumentSummary {
            id: row.try_get("id")?,
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            author: normalize_author(row.try_get("author")?),
            year: normalize_year(row.try_get("year")?),
            doc_type: row
                .try_get::<Option<String>, _>("source_type")?
                .unwrap_or_default(),
            description: row
                .try_get::<Option<String>, _>("description")?
                .unwrap_or_default(),
            url: row
                .try_get::<Option<String>, _>("url")?
                .filter(|u| !u.trim().is_empty()),
            word_count: normalize_word_count(row.try_get("word_count")?),
            tags: decode_tags(row.try_get("tags")?),
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>, ApiError> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref()
            .map(Self::row_to_document)
            .transpose()
            .map_err(ApiError::internal)
    }

    async fn get_documents(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DocumentRecord>, ApiError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents WHERE id IN (", COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = Self::row_to_document(row).map_err(ApiError::internal)?;
            found.insert(record.id.clone(), record);
        }
        Ok(found)
    }

    async fn lexical_search(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<DocumentRecord>, ApiError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .take(MAX_LEXICAL_TERMS)
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents WHERE ", COLUMNS));
        for (term_idx, term) in terms.iter().enumerate() {
            if term_idx > 0 {
                builder.push(" OR ");
            }
            let pattern = format!("%{}%", escape_like(term));
            builder.push("(");
            for (col_idx, column) in LEXICAL_COLUMNS.iter().enumerate() {
                if col_idx > 0 {
                    builder.push(" OR ");
                }
                builder.push(format!("LOWER({}) LIKE ", column));
                builder.push_bind(pattern.clone());
                builder.push(" ESCAPE '\\'");
            }
            builder.push(")");
        }
        builder.push(" ORDER BY rowid LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        rows.iter()
            .map(Self::row_to_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    async fn list_documents(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentSummary>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY rowid LIMIT ?1 OFFSET ?2",
            SUMMARY_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter()
            .map(Self::row_to_summary)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    async fn scan_documents(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>, ApiError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY rowid LIMIT ?1 OFFSET ?2",
            COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter()
            .map(Self::row_to_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count.max(0) as usize)
    }

    async fn document_types(&self) -> Result<Vec<String>, ApiError> {
        sqlx::query_scalar(
            "SELECT DISTINCT source_type FROM documents
             WHERE source_type IS NOT NULL AND TRIM(source_type) != ''
             ORDER BY source_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)
    }

    async fn document_years(&self) -> Result<Vec<i32>, ApiError> {
        let years: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT year FROM documents
             WHERE year IS NOT NULL AND year > 0
             ORDER BY year DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(years
            .into_iter()
            .filter_map(|y| i32::try_from(y).ok())
            .collect())
    }

    async fn document_authors(&self) -> Result<Vec<String>, ApiError> {
        sqlx::query_scalar(
            "SELECT DISTINCT author FROM documents
             WHERE author IS NOT NULL AND TRIM(author) != '' AND author != ?1
             ORDER BY author",
        )
        .bind(UNKNOWN_AUTHOR)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)
    }

    async fn counts_by_type(&self) -> Result<Vec<TypeCount>, ApiError> {
        let rows = sqlx::query(
            "SELECT source_type, COUNT(*) AS total FROM documents
             GROUP BY source_type
             ORDER BY total DESC, source_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter()
            .map(|row| {
                let doc_type: Option<String> = row.try_get("source_type")?;
                let total: i64 = row.try_get("total")?;
                Ok(TypeCount {
                    doc_type: doc_type.unwrap_or_default(),
                    count: total.max(0) as usize,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(ApiError::internal)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn normalize_author(raw: Option<String>) -> String {
    raw.filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

fn normalize_year(raw: Option<i64>) -> Option<i32> {
    raw.filter(|y| *y > 0).and_then(|y| i32::try_from(y).ok())
}

fn normalize_word_count(raw: Option<i64>) -> u32 {
    raw.map(|w| u32::try_from(w.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Tags are stored as a JSON array; older rows may hold a comma list.
fn decode_tags(raw: Option<String>) -> BTreeSet<String> {
    let Some(raw) = raw else {
        return BTreeSet::new();
    };
    if let Ok(tags) = serde_json::from_str::<BTreeSet<String>>(&raw) {
        return tags;
    }
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zheng_he() -> DocumentRecord {
        let mut doc = DocumentRecord::new("doc-1", "Zheng He: China's Great Explorer");
        doc.author = "Edward Dreyer".to_string();
        doc.year = Some(2007);
        doc.doc_type = "book".to_string();
        doc.description = "Voyages of the treasure fleet".to_string();
        doc.content_preview = "Between 1405 and 1433 ...".to_string();
        doc.content = "Between 1405 and 1433 the treasure fleet sailed seven times.".to_string();
        doc.source_reference = "books/dreyer.pdf".to_string();
        doc.url = Some("https://example.org/dreyer".to_string());
        doc.word_count = 11;
        doc.tags = ["ming".to_string(), "navy".to_string()].into_iter().collect();
        doc
    }

    async fn seeded_store(dir: &tempfile::TempDir) -> SqliteDocumentStore {
        let store = SqliteDocumentStore::create(dir.path().join("kb.db"))
            .await
            .unwrap();
        let mut other = DocumentRecord::new("doc-2", "Venetian Trade Routes");
        other.content = "Spices moved through 100% of the Levant markets.".to_string();
        other.doc_type = "article".to_string();
        let mut anonymous = DocumentRecord::new("doc-3", "Ship Logs");
        anonymous.year = Some(1421);
        anonymous.doc_type = "article".to_string();
        store
            .insert_batch(&[zheng_he(), other, anonymous])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn get_document_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let fetched = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(fetched, zheng_he());
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let err = store.insert_document(&zheng_he()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn get_documents_omits_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let found = store
            .get_documents(&["doc-2".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("doc-2"));
    }

    #[tokio::test]
    async fn lexical_search_is_case_insensitive_and_escapes_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let hits = store
            .lexical_search(&["ZHENG".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-1");

        let by_tag = store.lexical_search(&["navy".to_string()], 10).await.unwrap();
        assert_eq!(by_tag[0].id, "doc-1");

        let literal = store.lexical_search(&["100%".to_string()], 10).await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].id, "doc-2");

        let underscore = store.lexical_search(&["_".to_string()], 10).await.unwrap();
        assert!(underscore.is_empty());
    }

    #[tokio::test]
    async fn lexical_search_returns_rowid_order_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let hits = store
            .lexical_search(&["ship".to_string(), "venetian".to_string()], 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-2", "doc-3"]);

        let capped = store
            .lexical_search(&["ship".to_string(), "venetian".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn facets_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        assert_eq!(store.document_types().await.unwrap(), vec!["article", "book"]);
        assert_eq!(store.document_years().await.unwrap(), vec![2007, 1421]);
        assert_eq!(store.document_authors().await.unwrap(), vec!["Edward Dreyer"]);

        let counts = store.counts_by_type().await.unwrap();
        assert_eq!(
            counts[0],
            TypeCount {
                doc_type: "article".to_string(),
                count: 2
            }
        );

        let page = store.list_documents(2, 1).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-2", "doc-3"]);
    }

    #[tokio::test]
    async fn scan_pages_full_records_in_rowid_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let first = store.scan_documents(2, 0).await.unwrap();
        assert_eq!(first[0], zheng_he());
        assert_eq!(first[1].id, "doc-2");
        assert!(first[1].content.contains("Levant"));

        let rest = store.scan_documents(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "doc-3");
        assert!(store.scan_documents(2, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_open_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteDocumentStore::open_read_only(dir.path().join("absent.db"))
            .await
            .is_err());

        let path = dir.path().join("kb.db");
        SqliteDocumentStore::create(&path)
            .await
            .unwrap()
            .insert_document(&zheng_he())
            .await
            .unwrap();

        let reader = SqliteDocumentStore::open_read_only(&path).await.unwrap();
        assert_eq!(reader.count().await.unwrap(), 1);
    }

    #[test]
    fn tags_accept_json_or_comma_lists() {
        assert_eq!(decode_tags(Some("[\"a\",\"b\"]".into())).len(), 2);
        assert_eq!(decode_tags(Some("a, b ,".into())).len(), 2);
        assert!(decode_tags(None).is_empty());
    }
}
