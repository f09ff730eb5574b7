//! LLM-driven entity/relationship extraction (SPEC_FULL §4.4 step 7),
//! grounded on the source crate's `create_json_ld`/`LLMGraphAnalysisResult`
//! structured-output call. The source crate resolved its temporary LLM keys
//! to UUIDs with a dedicated `GraphMapper` type; here entities already carry
//! a real id the moment `GraphEntity::new` constructs them, so the key→id
//! resolution is just a local `HashMap` built while walking the response.

use std::collections::HashMap;

use common::{
    error::AppError,
    model::chat::{ChatModel, ChatOptions, ChatTurn},
    storage::types::graph_entity::GraphEntity,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_RELATIONSHIP_WEIGHT: f32 = 1.0;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert knowledge graph builder. You will receive a document's text content and must extract the entities it discusses and the relationships between them, as a structured JSON object.\n\nGuidelines:\n1. Do NOT invent ids. Use a short unique `key` for each entity, local to this response.\n2. Give each entity a concise `name`, a one or two sentence `description`, and an `entity_type` (e.g. person, organization, concept, place, event).\n3. Only emit a relationship between two keys that both appear in `knowledge_entities`.\n4. Prefer precision over recall: omit entities or relationships you are not confident about.";

fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "knowledge_entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" },
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "entity_type": { "type": "string" }
                    },
                    "required": ["key", "name", "description", "entity_type"],
                    "additionalProperties": false
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "source": { "type": "string" },
                        "target": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["type", "source", "target", "description"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["knowledge_entities", "relationships"],
        "additionalProperties": false
    })
}

/// One entity mention as returned by the model, keyed by a response-local
/// identifier rather than a real id.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct LlmEntity {
    key: String,
    name: String,
    description: String,
    entity_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct LlmRelationship {
    #[serde(rename = "type")]
    type_: String,
    source: String,
    target: String,
    description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct LlmGraphAnalysis {
    knowledge_entities: Vec<LlmEntity>,
    relationships: Vec<LlmRelationship>,
}

/// A relationship between two already-assigned entity ids, shaped to drop
/// straight into `common::retrieval::engines::graph::store_relationships`.
#[derive(Debug, Clone)]
pub struct RelationshipDraft {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub description: String,
    pub weight: f32,
    pub chunk_ids: Vec<String>,
}

impl RelationshipDraft {
    #[must_use]
    pub fn into_tuple(self) -> (String, String, String, String, f32, Vec<String>) {
        (
            self.source_id,
            self.target_id,
            self.relationship_type,
            self.description,
            self.weight,
            self.chunk_ids,
        )
    }
}

/// Output of a single extraction pass: entities, still missing their
/// originating chunk ids, and relationships resolved to real entity ids.
pub struct GraphExtraction {
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<RelationshipDraft>,
}

/// Calls `chat_model` with `text` (optionally guided by the KB's configured
/// extraction template) and turns the response into entity/relationship
/// rows namespaced to `(tenant_id, kb_id, knowledge_id)`.
pub async fn extract_graph(
    chat_model: &ChatModel,
    template: Option<&str>,
    tenant_id: &str,
    kb_id: &str,
    knowledge_id: &str,
    text: &str,
) -> Result<GraphExtraction, AppError> {
    let system = template.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();
    let turn = ChatTurn {
        system: Some(system),
        user: text.to_string(),
    };
    let options = ChatOptions {
        max_tokens: 2048,
        ..ChatOptions::default()
    };

    let raw = chat_model
        .complete_json(
            &turn,
            &options,
            "graph_extraction",
            "Entities and relationships extracted from a document",
            extraction_schema(),
        )
        .await?;

    let parsed: LlmGraphAnalysis = serde_json::from_str(&raw)
        .map_err(|err| AppError::LLMParsing(format!("graph extraction response: {err}")))?;

    let mut key_to_id: HashMap<String, String> = HashMap::with_capacity(parsed.knowledge_entities.len());
    let mut entities = Vec::with_capacity(parsed.knowledge_entities.len());

    for llm_entity in &parsed.knowledge_entities {
        let entity = GraphEntity::new(
            tenant_id.to_string(),
            kb_id.to_string(),
            knowledge_id.to_string(),
            llm_entity.name.clone(),
            llm_entity.entity_type.clone(),
            llm_entity.description.clone(),
        );
        key_to_id.insert(llm_entity.key.clone(), entity.id.clone());
        entities.push(entity);
    }

    let relationships = parsed
        .relationships
        .into_iter()
        .filter_map(|rel| {
            let source_id = key_to_id.get(&rel.source)?.clone();
            let target_id = key_to_id.get(&rel.target)?.clone();
            Some(RelationshipDraft {
                source_id,
                target_id,
                relationship_type: rel.type_,
                description: rel.description,
                weight: DEFAULT_RELATIONSHIP_WEIGHT,
                chunk_ids: Vec::new(),
            })
        })
        .collect();

    Ok(GraphExtraction { entities, relationships })
}

/// Tags each extracted entity with the ids of chunks whose content mentions
/// its name, and stamps the same chunk ids onto any relationship whose
/// endpoints were both found in that chunk. Simple substring matching; the
/// source crate's chunk↔entity linkage was likewise name-based rather than
/// span-tracked.
pub fn link_entities_to_chunks(
    entities: &mut [GraphEntity],
    relationships: &mut [RelationshipDraft],
    chunk_ids_by_content: &[(String, String)],
) {
    let mut name_to_id: HashMap<&str, &str> = HashMap::with_capacity(entities.len());
    for entity in entities.iter() {
        name_to_id.insert(entity.name.as_str(), entity.id.as_str());
    }

    for entity in entities.iter_mut() {
        for (chunk_id, content) in chunk_ids_by_content {
            if content.contains(entity.name.as_str()) {
                entity.chunk_ids.push(chunk_id.clone());
            }
        }
    }

    let id_to_name: HashMap<&str, &str> = name_to_id.iter().map(|(k, v)| (*v, *k)).collect();
    for rel in relationships.iter_mut() {
        let Some(source_name) = id_to_name.get(rel.source_id.as_str()) else {
            continue;
        };
        let Some(target_name) = id_to_name.get(rel.target_id.as_str()) else {
            continue;
        };
        for (chunk_id, content) in chunk_ids_by_content {
            if content.contains(source_name) && content.contains(target_name) {
                rel.chunk_ids.push(chunk_id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_entities_to_chunks_tags_mentions() {
        let mut entities = vec![GraphEntity::new(
            "tenant-1".into(),
            "kb-1".into(),
            "knowledge-1".into(),
            "Ada Lovelace".into(),
            "person".into(),
            "mathematician".into(),
        )];
        let mut relationships = Vec::new();
        let chunks = vec![
            ("chunk-1".to_string(), "Ada Lovelace wrote the first algorithm.".to_string()),
            ("chunk-2".to_string(), "Unrelated content entirely.".to_string()),
        ];

        link_entities_to_chunks(&mut entities, &mut relationships, &chunks);

        assert_eq!(entities[0].chunk_ids, vec!["chunk-1".to_string()]);
    }

    #[test]
    fn relationship_draft_into_tuple_preserves_order() {
        let draft = RelationshipDraft {
            source_id: "a".into(),
            target_id: "b".into(),
            relationship_type: "RelatedTo".into(),
            description: "desc".into(),
            weight: 1.0,
            chunk_ids: vec!["c1".into()],
        };
        let (source, target, kind, description, weight, chunk_ids) = draft.into_tuple();
        assert_eq!(source, "a");
        assert_eq!(target, "b");
        assert_eq!(kind, "RelatedTo");
        assert_eq!(description, "desc");
        assert_eq!(weight, 1.0);
        assert_eq!(chunk_ids, vec!["c1".to_string()]);
    }
}
