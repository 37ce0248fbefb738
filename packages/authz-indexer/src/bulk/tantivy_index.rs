//! Tantivy authorization index
//!
//! One tantivy index per index name (`issues`, `components`...), created
//! lazily, in RAM or under `<root>/<index name>`. Documents are upserted by
//! `id` term (delete + add) and every `apply` commits once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tantivy::{
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    query::TermQuery,
    schema::{IndexRecordOption, Value},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tracing::{debug, info};

use super::schema::SchemaFields;
use super::{BulkOp, SearchBackend};
use crate::document::AuthorizationDoc;
use crate::error::{IndexerError, Result};
use crate::index_type::IndexType;

/// Single writer thread, small documents
const WRITER_HEAP_BYTES: usize = 20_000_000;

struct IndexHandle {
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

pub struct TantivyAuthorizationIndex {
    /// `None` for RAM indexes
    root: Option<PathBuf>,
    fields: SchemaFields,
    indexes: Mutex<HashMap<String, Arc<IndexHandle>>>,
}

impl TantivyAuthorizationIndex {
    pub fn in_ram() -> Result<Self> {
        Ok(Self {
            root: None,
            fields: SchemaFields::new()?,
            indexes: Mutex::new(HashMap::new()),
        })
    }

    pub fn in_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("Opening authorization indexes under {}", root.display());
        Ok(Self {
            root: Some(root),
            fields: SchemaFields::new()?,
            indexes: Mutex::new(HashMap::new()),
        })
    }

    /// RAM index when `index_dir` is `None`
    pub fn open(index_dir: Option<&Path>) -> Result<Self> {
        match index_dir {
            Some(dir) => Self::in_dir(dir),
            None => Self::in_ram(),
        }
    }

    fn handle(&self, index_name: &str) -> Result<Arc<IndexHandle>> {
        let mut indexes = self.indexes.lock()?;
        if let Some(handle) = indexes.get(index_name) {
            return Ok(handle.clone());
        }

        let schema = self.fields.schema.clone();
        let index = match &self.root {
            Some(root) => {
                let dir = root.join(index_name);
                std::fs::create_dir_all(&dir)?;
                Index::open_or_create(MmapDirectory::open(&dir)?, schema)?
            }
            None => Index::create_in_ram(schema),
        };
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        debug!("Opened tantivy index '{}'", index_name);
        let handle = Arc::new(IndexHandle {
            writer: Mutex::new(writer),
            reader,
        });
        indexes.insert(index_name.to_string(), handle.clone());
        Ok(handle)
    }

    fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.fields.id, id)
    }

    fn to_document(&self, doc: &AuthorizationDoc) -> TantivyDocument {
        let mut document = TantivyDocument::default();
        document.add_text(self.fields.id, &doc.id);
        document.add_text(self.fields.routing, &doc.routing);
        document.add_text(self.fields.doc_type, doc.index_type.name());
        document.add_bool(self.fields.allow_anyone, doc.allow_anyone);
        for group_id in &doc.group_ids {
            document.add_text(self.fields.group_ids, group_id);
        }
        for user_id in &doc.user_ids {
            document.add_text(self.fields.user_ids, user_id);
        }
        document
    }

    fn from_document(&self, index_type: &IndexType, document: &TantivyDocument) -> AuthorizationDoc {
        let text = |field| {
            document
                .get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let texts = |field| {
            document
                .get_all(field)
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        AuthorizationDoc {
            index_type: index_type.clone(),
            id: text(self.fields.id),
            routing: text(self.fields.routing),
            allow_anyone: document
                .get_first(self.fields.allow_anyone)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            group_ids: texts(self.fields.group_ids),
            user_ids: texts(self.fields.user_ids),
        }
    }

    fn write(&self, handle: &IndexHandle, ops: &[BulkOp]) -> Result<()> {
        let mut writer = handle.writer.lock()?;
        let outcome = (|| -> Result<()> {
            for op in ops {
                writer.delete_term(self.id_term(op.doc_id()));
                if let BulkOp::Upsert(doc) = op {
                    writer.add_document(self.to_document(doc))?;
                }
            }
            writer.commit()?;
            Ok(())
        })();

        if let Err(e) = outcome {
            // discard the partial batch so the next commit does not publish it
            writer.rollback()?;
            return Err(e);
        }
        handle.reader.reload()?;
        Ok(())
    }
}

#[async_trait]
impl SearchBackend for TantivyAuthorizationIndex {
    async fn apply(&self, index_type: &IndexType, ops: &[BulkOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if ops.iter().any(|op| matches!(op, BulkOp::Upsert(doc) if &doc.index_type != index_type)) {
            return Err(IndexerError::Search(format!(
                "Document of another index submitted to {}",
                index_type
            )));
        }
        let handle = self.handle(index_type.index())?;
        self.write(&handle, ops)?;
        debug!("Applied {} operations to {}", ops.len(), index_type);
        Ok(())
    }

    async fn get(&self, index_type: &IndexType, id: &str) -> Result<Option<AuthorizationDoc>> {
        let handle = self.handle(index_type.index())?;
        let searcher = handle.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);

        let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
        match hits.first() {
            Some((_score, address)) => {
                let document: TantivyDocument = searcher.doc(*address)?;
                Ok(Some(self.from_document(index_type, &document)))
            }
            None => Ok(None),
        }
    }

    async fn count(&self, index_type: &IndexType) -> Result<usize> {
        let handle = self.handle(index_type.index())?;
        let searcher = handle.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.doc_type, index_type.name()),
            IndexRecordOption::Basic,
        );
        Ok(searcher.search(&query, &Count)?)
    }
}
