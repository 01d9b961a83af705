//! Prompt templates. Plain `format!()` interpolation so a missing variable
//! is a compile-time error.

use crate::models::{GraphContext, MemoryHit, RetrievedChunk, SummaryFormat};

/// System prompt for answer generation. The refusal phrase is configured so
/// tests can assert the exact wording.
pub fn answer_system_prompt(refusal_phrase: &str) -> String {
    format!(
        r#"You are a document question-answering assistant.
Answer strictly from the provided context blocks and memories.
Do not use outside knowledge. Do not invent citations.
If the context is insufficient to answer the question, reply with exactly:
{refusal_phrase}"#
    )
}

/// User prompt for answer generation: context blocks in retrieval order,
/// each headed by its source file, then memory entries, then the question.
pub fn answer_user_prompt(
    query: &str,
    retrieved: &[RetrievedChunk],
    graph_context: &[GraphContext],
    memories: &[MemoryHit],
) -> String {
    let mut prompt = String::new();

    if retrieved.is_empty() {
        prompt.push_str("Context: (no matching documents)\n");
    } else {
        prompt.push_str("Context:\n\n");
        for chunk in retrieved {
            prompt.push_str(&format!("[Source: {}]\n", chunk.filename));
            if !chunk.matched_entities.is_empty() {
                prompt.push_str(&format!(
                    "(matched entities: {})\n",
                    chunk.matched_entities.join(", ")
                ));
            }
            for edge in graph_context.iter().filter(|e| e.chunk_id == chunk.id) {
                prompt.push_str(&format!(
                    "(hop {}) {} {} {}\n",
                    edge.hop, edge.source_entity, edge.edge_type, edge.target_entity
                ));
            }
            prompt.push_str(&chunk.text);
            prompt.push_str("\n\n");
        }
    }

    if !memories.is_empty() {
        prompt.push_str("Memories:\n");
        for hit in memories {
            let tag = if hit.shared {
                "[Shared Memory]"
            } else {
                "[User Memory]"
            };
            prompt.push_str(&format!("{tag} {}\n", hit.entry.text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {query}"));
    prompt
}

/// Extract named entities from a query for the graph lookup path.
pub fn entity_extraction_prompt(query: &str) -> String {
    format!(
        r#"Extract the named entities (people, organizations, products, places, projects) mentioned in this question.
Return a JSON object: {{"entities": ["name", ...]}}. Return {{"entities": []}} if there are none.

Question: {query}"#
    )
}

/// Single-call comparison across documents. Output must be a strict JSON
/// object; the workflow falls back to heading-based extraction on parse
/// failure.
pub fn comparison_prompt(query: &str, document_sections: &str) -> String {
    format!(
        r#"Compare the following documents with respect to this question: {query}

{document_sections}

Respond with a JSON object only:
{{"similarities": ["..."], "differences": ["..."], "insights": ["..."]}}

Each array holds short, standalone statements. Use the section headings
"Similarities", "Differences" and "Insights" only inside the JSON keys."#
    )
}

pub fn summary_prompt(format: SummaryFormat, filename: &str, content: &str) -> String {
    let instruction = match format {
        SummaryFormat::Brief => "Write a 2-3 sentence summary.",
        SummaryFormat::Detailed => {
            "Write a detailed summary of one or two paragraphs covering every major topic."
        }
        SummaryFormat::Executive => {
            "Write an executive summary: one short paragraph of key findings and implications."
        }
        SummaryFormat::Bullet => "Summarize as 4-8 concise bullet points.",
    };

    format!(
        r#"{instruction}
Summarize only what the document says; do not add outside information.

Document ({filename}):
{content}"#
    )
}

/// Fold older memory entries into one historical summary. Named entities,
/// dates and decisions survive verbatim in a critical-facts section.
pub fn memory_summarize_prompt(entries: &[&str]) -> String {
    let joined = entries
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Condense the following memory entries into a single summary.
Start the output with "[Historical Summary]".
End with a "Critical facts:" section listing every named entity, date and decision verbatim.

Entries:
{joined}"#
    )
}

/// Fallback confidence scoring when the provider exposes no logprobs: the
/// model rates how well the context supports the answer on 0-100.
pub fn confidence_rating_prompt(query: &str, answer: &str, context: &str) -> String {
    format!(
        r#"Rate from 0 to 100 how well the context below supports the answer to the question.
Respond with a JSON object only: {{"score": <0-100>}}.

Question: {query}
Answer: {answer}
Context:
{context}"#
    )
}
