//! Prompt templates for the pipeline's completion calls.
//!
//! Kept in one place so every model-facing string is easy to audit. These
//! build prompts only; user-facing messages belong to the caller.

use tome_core::Fragment;

use crate::state::ClusterSummary;

/// System prompt for the routing classification call.
pub const ROUTER_SYSTEM: &str = "\
You are a reading assistant that helps users chat with a knowledge base built \
from their uploaded documents. You have two destinations: answer_question \
(DEFAULT) and explore_overview (SPECIAL CASES ONLY).\n\
\n\
answer_question (DEFAULT) - use for ALL regular questions and information \
requests: any question seeking specific information from the documents, \
questions asking what, how, why, when, where about content, requests to \
explain concepts or find information.\n\
\n\
explore_overview (SPECIAL CASES ONLY) - use ONLY when the user explicitly \
requests exploration: overview, explore, discover, main themes, key ideas, \
overall summary.\n\
\n\
IMPORTANT: default to answer_question unless the user explicitly uses \
exploration keywords.";

/// Prompt for the routing call.
pub fn router(user_query: &str) -> String {
    format!("User query: {}", user_query)
}

/// Prompt asking the model to decompose a query into sub-queries.
pub fn decompose(user_query: &str) -> String {
    format!(
        "You are a query retrieval optimizer for vector store semantic search. \
         Decompose the following query into simpler, smaller sub-queries better \
         suited for vector store search. Decide yourself how many sub-queries \
         are optimal for retrieval. Put each sub-query on its own line with no \
         numbering. User query: {}",
        user_query
    )
}

/// Prompt asking the model to summarize one cluster of fragments.
pub fn map_cluster(fragments: &[&Fragment]) -> String {
    let docs = fragments
        .iter()
        .enumerate()
        .map(|(i, f)| format!("doc {}:\n{}", i + 1, f.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize the following cluster of documents in a concise and \
         informative manner.\n\n{}",
        docs
    )
}

/// Prompt combining the per-cluster summaries into one overview.
pub fn reduce(summaries: &[ClusterSummary]) -> String {
    let text = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| format!("map-summary {}:\n{}", i + 1, s.summary))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize the following sub-summaries, produced by map-reduce \
         summarization, into one concise and informative overview.\n\n{}",
        text
    )
}

/// Prompt synthesizing an answer from retrieved fragments.
pub fn synthesize(user_query: &str, fragments: &[&Fragment]) -> String {
    let retrieved = if fragments.is_empty() {
        "(nothing relevant was retrieved)".to_string()
    } else {
        fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "You are a helpful summarization assistant. Create a comprehensive \
         answer from the retrieved information that directly addresses the \
         user's query. Focus on relevant information and maintain accuracy. \
         If nothing relevant was retrieved, say so.\n\n\
         User query: {}\n\nRetrieved information:\n{}",
        user_query, retrieved
    )
}
