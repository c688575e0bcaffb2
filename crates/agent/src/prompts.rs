//! Prompt assembly for the two LLM passes.
//!
//! The generation prompt embeds the schema catalog and the read-only query
//! rules; the composition prompt carries the answering persona. Both passes
//! receive conversation context from the thread store, never raw `Message`
//! structs.

use leadlens_core::{QueryResult, SchemaCatalog};

/// How many prior turns the generation pass sees.
pub const MAX_CONTEXT_TURNS: usize = 8;

/// How many result rows are serialized into the composition context.
pub const MAX_CONTEXT_ROWS: usize = 50;

/// System prompt for the non-streaming SQL generation pass.
pub fn generation_system_prompt(catalog: &SchemaCatalog) -> String {
    format!(
        "You are a PostgreSQL analyst for a CRM system. Translate the user's \
         question into exactly one read-only SQL query.\n\n\
         {}\n\
         Rules:\n\
         - Produce a single statement starting with SELECT or WITH. Never use \
           INSERT, UPDATE, DELETE, DROP, ALTER, CREATE, TRUNCATE, GRANT, \
           REVOKE, EXECUTE, or COPY.\n\
         - Prefer the precomputed vw_* views over joining base tables.\n\
         - Give every aggregate or computed column a clear alias.\n\
         - Add LIMIT 100 unless the user asks for a different amount.\n\
         - Reply with the SQL inside a ```sql fenced block and nothing else.",
        catalog.render()
    )
}

/// System prompt for the streaming answer composition pass.
pub fn composition_system_prompt() -> &'static str {
    "You are a friendly CRM analytics assistant. You answer questions about \
     leads, sales people, and activity using the query results provided in \
     the user's message.\n\
     - Narrate the numbers conversationally; use short markdown lists or \
       tables when they help.\n\
     - Never show raw SQL, raw error text, or internal identifiers unless \
       the user explicitly asks for the query.\n\
     - If the context says the query failed, answer from conversation \
       context where you can, or ask the user to rephrase their question. \
       Do not apologize more than once."
}

/// Context block appended to the user's question after a successful query.
pub fn data_context(result: &QueryResult) -> String {
    let shown = result.rows.len().min(MAX_CONTEXT_ROWS);
    let rows_json = serde_json::to_string(&result.rows[..shown]).unwrap_or_else(|_| "[]".to_string());

    let mut block = format!(
        "\n\n[Query context]\nSQL: {}\nRow count: {}\nColumns: {}\nRows (JSON): {}",
        result.sql,
        result.row_count,
        result.columns.join(", "),
        rows_json
    );
    if result.row_count > shown {
        block.push_str(&format!("\n(only the first {shown} rows are shown)"));
    }
    block
}

/// Context block appended to the user's question when generation, validation
/// or execution failed. Instructs the composition pass to degrade gracefully
/// instead of echoing the error.
pub fn failure_context(reason: &str) -> String {
    format!(
        "\n\n[Query context]\nThe data query for this question could not be \
         run ({reason}). Answer conversationally from what you already know \
         in this conversation, or ask the user to rephrase the question. Do \
         not mention SQL or show this error text."
    )
}
