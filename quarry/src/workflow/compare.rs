use std::sync::Arc;

use uuid::Uuid;

use crate::db::DatabaseBackend;
use crate::error::{QuarryError, Result};
use crate::llm::{prompts, CompletionOptions, LanguageModel};
use crate::models::{
    compare_thread_id, Citation, CompareNode, CompareStatus, ComparisonState, Principal,
};
use crate::retrieval::{RetrievalOptions, Retriever};

const CHUNKS_PER_DOCUMENT: usize = 5;
const EDGES_PER_CHUNK: u32 = 50;
const COMPARE_TEXT_CHARS: usize = 500;

/// Durable four-node comparison: retrieve, expand_graph, compare, generate.
/// The whole state is checkpointed after every node under a tenant-scoped
/// thread id; re-invocation resumes from the first incomplete node.
#[derive(Clone)]
pub struct ComparisonWorkflow {
    db: Arc<dyn DatabaseBackend>,
    retriever: Retriever,
    llm: Option<Arc<dyn LanguageModel>>,
    shared_sentinel: String,
    excerpt_max_chars: usize,
}

impl ComparisonWorkflow {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        retriever: Retriever,
        llm: Option<Arc<dyn LanguageModel>>,
        shared_sentinel: String,
        excerpt_max_chars: usize,
    ) -> Self {
        Self {
            db,
            retriever,
            llm,
            shared_sentinel,
            excerpt_max_chars,
        }
    }

    pub async fn run(
        &self,
        principal: &Principal,
        query: &str,
        document_ids: &[Uuid],
        session_id: &str,
    ) -> Result<ComparisonState> {
        if !(2..=5).contains(&document_ids.len()) {
            return Err(QuarryError::Validation(
                "Comparison needs between 2 and 5 documents".into(),
            ));
        }
        if query.trim().len() < 10 {
            return Err(QuarryError::Validation(
                "Comparison query must be at least 10 characters".into(),
            ));
        }

        // Every document must be visible; an invisible id is an
        // authorization failure, never a silent drop.
        for id in document_ids {
            let visible = match self.db.get_document(*id).await? {
                Some(doc) => {
                    doc.tenant_key == principal.tenant_key()
                        || (doc.tenant_key == self.shared_sentinel && principal.can_read_shared())
                }
                None => false,
            };
            if !visible {
                return Err(QuarryError::Forbidden(format!(
                    "Document {id} is not accessible"
                )));
            }
        }

        let thread_id = compare_thread_id(&principal.tenant_key(), session_id);

        let mut state = match self.db.load(&thread_id).await? {
            Some(existing)
                if existing.query == query
                    && existing.document_ids == document_ids
                    && existing.status != CompareStatus::Failed =>
            {
                tracing::info!(thread_id = %thread_id, "Resuming comparison from checkpoint");
                existing
            }
            _ => ComparisonState::new(
                query.to_string(),
                principal.tenant_key(),
                document_ids.to_vec(),
            ),
        };

        while let Some(node) = state.resume_from() {
            tracing::debug!(thread_id = %thread_id, node = ?node, "Running comparison node");
            match node {
                CompareNode::Retrieve => self.node_retrieve(principal, &mut state).await?,
                CompareNode::ExpandGraph => self.node_expand_graph(principal, &mut state).await?,
                CompareNode::Compare => self.node_compare(&mut state).await?,
                CompareNode::Generate => self.node_generate(&mut state),
            }
            state.completed_node = Some(node);
            if node == CompareNode::Generate {
                state.status = CompareStatus::Completed;
            }
            self.db.save(&thread_id, &state).await?;
        }

        Ok(state)
    }

    async fn node_retrieve(
        &self,
        principal: &Principal,
        state: &mut ComparisonState,
    ) -> Result<()> {
        for doc_id in state.document_ids.clone() {
            let output = self
                .retriever
                .retrieve_for(
                    principal,
                    &state.query,
                    &[doc_id],
                    CHUNKS_PER_DOCUMENT,
                    RetrievalOptions::default(),
                )
                .await?;
            state.retrieved_chunks.insert(doc_id, output.chunks);
        }
        Ok(())
    }

    async fn node_expand_graph(
        &self,
        principal: &Principal,
        state: &mut ComparisonState,
    ) -> Result<()> {
        let tenant_keys = principal.visible_tenant_keys(&self.shared_sentinel);

        for doc_id in state.document_ids.clone() {
            let mut edges = Vec::new();
            for chunk in state.retrieved_chunks.get(&doc_id).into_iter().flatten() {
                match self
                    .db
                    .entity_context_for_chunk(chunk.id, &tenant_keys, EDGES_PER_CHUNK)
                    .await
                {
                    Ok(chunk_edges) => edges.extend(chunk_edges),
                    Err(error) => {
                        tracing::warn!(chunk_id = %chunk.id, error = %error, "Graph expansion failed");
                    }
                }
            }
            state.graph_context.insert(doc_id, edges);
        }
        Ok(())
    }

    async fn node_compare(&self, state: &mut ComparisonState) -> Result<()> {
        let Some(llm) = &self.llm else {
            // Analysis degrades to empty arrays; the workflow still completes.
            return Ok(());
        };

        let sections = self.document_sections(state);
        let prompt = prompts::comparison_prompt(&state.query, &sections);

        match llm.complete_json(&prompt, &CompletionOptions::default()).await {
            Ok(value) => {
                state.similarities = string_array(&value["similarities"]);
                state.differences = string_array(&value["differences"]);
                state.insights = string_array(&value["insights"]);
            }
            Err(error) => {
                tracing::warn!(error = %error, "Strict JSON comparison failed; trying headings");
                match llm.complete(None, &prompt, &CompletionOptions::default()).await {
                    Ok(completion) => {
                        let (similarities, differences, insights) =
                            parse_heading_sections(&completion.text);
                        state.similarities = similarities;
                        state.differences = differences;
                        state.insights = insights;
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Comparison analysis failed entirely");
                    }
                }
            }
        }

        Ok(())
    }

    fn node_generate(&self, state: &mut ComparisonState) {
        let mut response = format!("## Comparison: {}\n\n", state.query);

        for (title, items) in [
            ("Similarities", &state.similarities),
            ("Differences", &state.differences),
            ("Insights", &state.insights),
        ] {
            response.push_str(&format!("### {title}\n"));
            if items.is_empty() {
                response.push_str("_None identified._\n");
            } else {
                for item in items {
                    response.push_str(&format!("- {item}\n"));
                }
            }
            response.push('\n');
        }

        let mut citations = Vec::new();
        for doc_id in &state.document_ids {
            for chunk in state.retrieved_chunks.get(doc_id).into_iter().flatten() {
                citations.push(Citation::from_chunk(chunk, self.excerpt_max_chars));
            }
        }

        state.response = response;
        state.citations = citations;
    }

    fn document_sections(&self, state: &ComparisonState) -> String {
        let mut sections = String::new();
        for doc_id in &state.document_ids {
            let chunks = state.retrieved_chunks.get(doc_id);
            let filename = chunks
                .and_then(|c| c.first())
                .map(|c| c.filename.as_str())
                .unwrap_or("unknown");
            sections.push_str(&format!("Document {doc_id} ({filename}):\n"));

            for chunk in chunks.into_iter().flatten() {
                let text: String = chunk.text.chars().take(COMPARE_TEXT_CHARS).collect();
                sections.push_str(&format!("- {text}\n"));
            }
            for edge in state.graph_context.get(doc_id).into_iter().flatten() {
                sections.push_str(&format!(
                    "  (hop {}) {} {} {}\n",
                    edge.hop, edge.source_entity, edge.edge_type, edge.target_entity
                ));
            }
            sections.push('\n');
        }
        sections
    }
}

fn string_array(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fallback parser for a prose response with "Similarities" / "Differences"
/// / "Insights" headings and bullet lists.
fn parse_heading_sections(text: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut similarities = Vec::new();
    let mut differences = Vec::new();
    let mut insights = Vec::new();
    let mut current: Option<&mut Vec<String>> = None;

    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches('#').trim();
        let lower = trimmed.to_lowercase();

        if lower.starts_with("similarit") {
            current = Some(&mut similarities);
            continue;
        } else if lower.starts_with("differen") {
            current = Some(&mut differences);
            continue;
        } else if lower.starts_with("insight") {
            current = Some(&mut insights);
            continue;
        }

        let item = trimmed
            .trim_start_matches(['-', '*'])
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
            .trim();
        if item.is_empty() {
            continue;
        }
        if let Some(section) = current.as_deref_mut() {
            section.push(item.to_string());
        }
    }

    (similarities, differences, insights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_fallback_extracts_sections() {
        let text = r#"
## Similarities
- Both cover Q3 revenue.
- Both mention Atlas.

## Differences
1. Only one lists staffing.

## Insights
* Combine the budgets.
"#;
        let (similarities, differences, insights) = parse_heading_sections(text);
        assert_eq!(
            similarities,
            vec!["Both cover Q3 revenue.", "Both mention Atlas."]
        );
        assert_eq!(differences, vec!["Only one lists staffing."]);
        assert_eq!(insights, vec!["Combine the budgets."]);
    }

    #[test]
    fn heading_fallback_handles_empty_input() {
        let (similarities, differences, insights) = parse_heading_sections("nothing structured");
        assert!(similarities.is_empty());
        assert!(differences.is_empty());
        assert!(insights.is_empty());
    }

    #[test]
    fn string_array_filters_non_strings() {
        let value = serde_json::json!(["a", 1, "b", null]);
        assert_eq!(string_array(&value), vec!["a", "b"]);
        assert!(string_array(&serde_json::json!(null)).is_empty());
    }
}
