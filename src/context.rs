//! Context assembly for the generation prompt, plus the diagnostic message
//! produced when every retrieval tier came back empty.

use crate::retriever::Candidate;
use crate::store::SearchBackend;

/// Message returned whenever no context could be retrieved. Diagnostic hints
/// are appended to it; it is never followed by a generation call.
pub const NO_CONTEXT_MESSAGE: &str =
    "I cannot find any relevant information in the knowledge base to answer that question.";

/// Formats retrieved candidates into labeled blocks, in retrieved order.
///
/// Missing fields render as a literal `N/A`. Returns `None` for an empty
/// candidate list — no block is ever fabricated.
pub fn assemble(candidates: &[Candidate]) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    let blocks: Vec<String> = candidates
        .iter()
        .map(|candidate| {
            format!(
                "--- DOCUMENT START ---\n\
                 Program Name: {}\n\
                 Title: {}\n\
                 Content: {}\n\
                 --- DOCUMENT END ---",
                field_or_na(&candidate.program_name),
                field_or_na(&candidate.title),
                field_or_na(&candidate.text),
            )
        })
        .collect();
    Some(blocks.join("\n\n"))
}

fn field_or_na(field: &Option<String>) -> &str {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => "N/A",
    }
}

/// Builds the user-facing message for a query that matched nothing.
///
/// Probes the store to distinguish two failure modes: embeddings exist but
/// the named vector index is absent (suggest index creation with the observed
/// dimensionality), or no embeddings exist at all (suggest running the
/// backfill). Probe errors degrade to the plain not-found message.
pub async fn diagnostic_message(
    store: &dyn SearchBackend,
    vector_field: &str,
    index_name: &str,
) -> String {
    let Ok(count) = store.embedded_count().await else {
        return NO_CONTEXT_MESSAGE.to_string();
    };
    if count == 0 {
        return format!(
            "{NO_CONTEXT_MESSAGE}\n\nHint: no stored documents carry an embedding yet. \
             Run ingestion and the embedding backfill to populate the '{vector_field}' field."
        );
    }

    let dims = store.sample_embedding_len().await.ok().flatten();
    let index_present = store.vector_index_exists().await.unwrap_or(false);
    if index_present {
        return format!(
            "{NO_CONTEXT_MESSAGE}\n\nHint: {count} embedded document(s) are present and the \
             '{index_name}' index exists, but no retrieval tier matched the query."
        );
    }
    match dims {
        Some(dims) => format!(
            "{NO_CONTEXT_MESSAGE}\n\nHint: {count} embedded document(s) are present \
             ({dims}-dimensional '{vector_field}' field), but no vector index named \
             '{index_name}' exists. Create it over '{vector_field}' with {dims} dimensions \
             to enable semantic search."
        ),
        None => format!(
            "{NO_CONTEXT_MESSAGE}\n\nHint: {count} embedded document(s) are present, but no \
             vector index named '{index_name}' exists on the '{vector_field}' field."
        ),
    }
}
