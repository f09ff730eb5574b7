use std::{path::Path, sync::Mutex};

use async_trait::async_trait;
use tantivy::{
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, Schema, FAST, STORED, STRING, TEXT},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};

use crate::{
    error::AppError,
    retrieval::{OnConflict, RetrievalBackend, RetrievalHit, RetrieveParams, RetrieverType},
    storage::types::index_entry::{IndexEntry, SourceType},
};

struct Fields {
    entry_id: Field,
    chunk_id: Field,
    knowledge_id: Field,
    kb_id: Field,
    content: Field,
    embedding_json: Field,
    dimension: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let entry_id = builder.add_text_field("entry_id", STRING | STORED);
    let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
    let knowledge_id = builder.add_text_field("knowledge_id", STRING | STORED);
    let kb_id = builder.add_text_field("kb_id", STRING | STORED);
    let content = builder.add_text_field("content", TEXT | STORED);
    let embedding_json = builder.add_text_field("embedding_json", STORED);
    let dimension = builder.add_u64_field("dimension", STORED | FAST);
    let schema = builder.build();
    (
        schema,
        Fields {
            entry_id,
            chunk_id,
            knowledge_id,
            kb_id,
            content,
            embedding_json,
            dimension,
        },
    )
}

/// A second, independent full-text/vector engine backed by a local
/// `tantivy` index. Keyword search uses tantivy's BM25 query parser.
/// Tantivy has no native ANN index, so the vector path scores candidates
/// by brute-force cosine over a stored embedding field — a documented
/// design choice (index-build simplicity over query speed), not a bug.
pub struct TantivyRetrievalEngine {
    index: Index,
    fields: Fields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

impl TantivyRetrievalEngine {
    pub fn open(index_dir: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_dir).map_err(AppError::Io)?;
        let (schema, fields) = build_schema();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir)
                .map_err(|e| AppError::InternalError(format!("tantivy open failed: {e}")))?
        } else {
            Index::create_in_dir(index_dir, schema)
                .map_err(|e| AppError::InternalError(format!("tantivy create failed: {e}")))?
        };

        let writer = index
            .writer(50_000_000)
            .map_err(|e| AppError::InternalError(format!("tantivy writer failed: {e}")))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::InternalError(format!("tantivy reader failed: {e}")))?;

        Ok(Self {
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
        })
    }

    fn to_document(&self, entry: &IndexEntry) -> TantivyDocument {
        let embedding_json = serde_json::to_string(&entry.embedding).unwrap_or_default();
        doc!(
            self.fields.entry_id => entry.id.clone(),
            self.fields.chunk_id => entry.chunk_id.clone(),
            self.fields.knowledge_id => entry.knowledge_id.clone(),
            self.fields.kb_id => entry.kb_id.clone(),
            self.fields.content => entry.content.clone(),
            self.fields.embedding_json => embedding_json,
            self.fields.dimension => u64::from(entry.dimension),
        )
    }

    fn kb_filter(&self, kb_ids: &[String]) -> Box<dyn Query> {
        let clauses: Vec<(Occur, Box<dyn Query>)> = kb_ids
            .iter()
            .map(|kb_id| {
                let term = Term::from_field_text(self.fields.kb_id, kb_id);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                (Occur::Should, query)
            })
            .collect();
        Box::new(BooleanQuery::new(clauses))
    }

    fn row_to_hit(&self, doc: &TantivyDocument) -> Option<(String, String, String, String, String, u32)> {
        let get_text = |field: Field| -> Option<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Some((
            get_text(self.fields.entry_id)?,
            get_text(self.fields.chunk_id)?,
            get_text(self.fields.knowledge_id)?,
            get_text(self.fields.kb_id)?,
            get_text(self.fields.content)?,
            doc.get_first(self.fields.dimension)
                .and_then(|v| v.as_u64())
                .map(|d| d as u32)
                .unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl RetrievalBackend for TantivyRetrievalEngine {
    fn engine_type(&self) -> &'static str {
        "tantivy_inverted_index"
    }

    fn supports(&self, _retriever_type: RetrieverType) -> bool {
        true
    }

    async fn save(&self, entry: &IndexEntry) -> Result<(), AppError> {
        self.batch_save(std::slice::from_ref(entry), OnConflict::Replace).await
    }

    async fn batch_save(&self, entries: &[IndexEntry], _on_conflict: OnConflict) -> Result<(), AppError> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        for entry in entries {
            let term = Term::from_field_text(self.fields.chunk_id, &entry.chunk_id);
            writer.delete_term(term);
            writer
                .add_document(self.to_document(entry))
                .map_err(|e| AppError::InternalError(format!("tantivy add failed: {e}")))?;
        }
        writer
            .commit()
            .map_err(|e| AppError::InternalError(format!("tantivy commit failed: {e}")))?;
        Ok(())
    }

    async fn delete_by_chunk_ids(&self, chunk_ids: &[String]) -> Result<(), AppError> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        for chunk_id in chunk_ids {
            writer.delete_term(Term::from_field_text(self.fields.chunk_id, chunk_id));
        }
        writer
            .commit()
            .map_err(|e| AppError::InternalError(format!("tantivy commit failed: {e}")))?;
        Ok(())
    }

    async fn delete_by_knowledge_ids(&self, knowledge_ids: &[String]) -> Result<(), AppError> {
        let mut writer = self.writer.lock().expect("tantivy writer mutex poisoned");
        for knowledge_id in knowledge_ids {
            writer.delete_term(Term::from_field_text(self.fields.knowledge_id, knowledge_id));
        }
        writer
            .commit()
            .map_err(|e| AppError::InternalError(format!("tantivy commit failed: {e}")))?;
        Ok(())
    }

    async fn retrieve(&self, params: &RetrieveParams) -> Result<Vec<RetrievalHit>, AppError> {
        let searcher = self.reader.searcher();
        let kb_filter = self.kb_filter(&params.kb_ids);

        match params.retriever_type {
            RetrieverType::Keywords => {
                let query_parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
                let text_query = query_parser
                    .parse_query(&params.query_text)
                    .map_err(|e| AppError::Validation(format!("bad query: {e}")))?;
                let combined = BooleanQuery::new(vec![
                    (Occur::Must, kb_filter),
                    (Occur::Must, text_query),
                ]);

                let top_docs = searcher
                    .search(&combined, &TopDocs::with_limit(params.top_k as usize))
                    .map_err(|e| AppError::InternalError(format!("tantivy search failed: {e}")))?;

                let mut hits = Vec::new();
                for (score, address) in top_docs {
                    let doc: TantivyDocument = searcher
                        .doc(address)
                        .map_err(|e| AppError::InternalError(format!("tantivy doc fetch failed: {e}")))?;
                    if let Some((_, chunk_id, knowledge_id, kb_id, content, dimension)) =
                        self.row_to_hit(&doc)
                    {
                        if params.exclude_chunk_ids.contains(&chunk_id)
                            || params.exclude_knowledge_ids.contains(&knowledge_id)
                        {
                            continue;
                        }
                        hits.push(RetrievalHit {
                            entry: IndexEntry::new(
                                String::new(),
                                kb_id,
                                knowledge_id,
                                chunk_id,
                                SourceType::Chunk,
                                content,
                                Vec::new(),
                            )
                            .with_dimension(dimension),
                            score,
                        });
                    }
                }
                Ok(hits)
            }
            RetrieverType::Vector => {
                let embedding = params.embedding.as_ref().ok_or_else(|| {
                    AppError::Validation("vector retrieval requires an embedding".into())
                })?;

                let top_docs = searcher
                    .search(&kb_filter, &TopDocs::with_limit(10_000))
                    .map_err(|e| AppError::InternalError(format!("tantivy search failed: {e}")))?;

                let mut hits = Vec::new();
                for (_, address) in top_docs {
                    let doc: TantivyDocument = searcher
                        .doc(address)
                        .map_err(|e| AppError::InternalError(format!("tantivy doc fetch failed: {e}")))?;
                    let embedding_json = doc
                        .get_first(self.fields.embedding_json)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let Ok(candidate): Result<Vec<f32>, _> = serde_json::from_str(embedding_json)
                    else {
                        continue;
                    };
                    let similarity = cosine_similarity(embedding, &candidate);
                    if similarity < params.threshold {
                        continue;
                    }
                    if let Some((_, chunk_id, knowledge_id, kb_id, content, dimension)) =
                        self.row_to_hit(&doc)
                    {
                        if params.exclude_chunk_ids.contains(&chunk_id)
                            || params.exclude_knowledge_ids.contains(&knowledge_id)
                        {
                            continue;
                        }
                        hits.push(RetrievalHit {
                            entry: IndexEntry::new(
                                String::new(),
                                kb_id,
                                knowledge_id,
                                chunk_id,
                                SourceType::Chunk,
                                content,
                                candidate,
                            )
                            .with_dimension(dimension),
                            score: similarity,
                        });
                    }
                }
                hits.sort_by(|a, b| b.score.total_cmp(&a.score));
                hits.truncate(params.top_k as usize);
                Ok(hits)
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
