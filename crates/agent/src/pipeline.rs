//! Request orchestration: Generate → Validate → Execute → Compose → Stream.
//!
//! Each stage's failure mode is a tagged variant carried forward into the
//! composition pass as failure context; no stage aborts the request. The
//! only terminal state a caller observes is a completed answer stream.

use std::sync::Arc;

use async_trait::async_trait;
use leadlens_core::{Message, QueryResult, SchemaCatalog};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::extract::recover_sql;
use crate::llm::{ChatClient, ChatMessage, ChatOptions};
use crate::prompts;
use crate::thread::ThreadStore;
use crate::validate::validate_sql;

/// Failure modes of the query executor, in the order they can occur.
#[derive(Clone, Debug, Error)]
pub enum ExecuteError {
    #[error("could not acquire a database connection: {0}")]
    Acquire(String),
    #[error("the query exceeded the statement timeout")]
    StatementTimeout,
    #[error("query failed: {0}")]
    Query(String),
}

/// Port implemented by the database layer. The pipeline only ever hands it
/// SQL that passed validation.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ExecuteError>;
}

/// Outcome of the generate/validate/execute stages, feeding composition.
enum QueryStage {
    Executed(QueryResult),
    ValidationRejected { reason: String },
    ExecutionFailed { reason: String },
    GenerationFailed { reason: String },
}

#[derive(Clone, Debug)]
pub struct PipelineModels {
    pub generation: String,
    pub answer: String,
}

#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub thread_id: String,
    pub response_id: String,
    pub question: String,
}

/// Sent to the caller when even the composition pass fails; the turn is
/// still committed so the conversation stays consistent.
const FALLBACK_ANSWER: &str =
    "I hit a snag answering that just now. Please try again in a moment.";

pub struct ChatPipeline {
    llm: Arc<dyn ChatClient>,
    executor: Arc<dyn QueryExecutor>,
    threads: Arc<ThreadStore>,
    catalog: SchemaCatalog,
    models: PipelineModels,
}

impl ChatPipeline {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        executor: Arc<dyn QueryExecutor>,
        threads: Arc<ThreadStore>,
        models: PipelineModels,
    ) -> Self {
        Self { llm, executor, threads, catalog: SchemaCatalog, models }
    }

    pub fn threads(&self) -> &Arc<ThreadStore> {
        &self.threads
    }

    /// Run one request end to end, sending incremental answer text on `tx`.
    /// Returns the accumulated final answer after committing both turn
    /// messages to the thread.
    pub async fn handle(&self, request: ChatRequest, tx: mpsc::Sender<String>) -> String {
        let thread = self.threads.get_or_create(&request.thread_id);
        let prior = thread.context_view();
        thread.append(Message::user(request.question.clone()));

        info!(
            event_name = "chat.request.received",
            thread_id = %request.thread_id,
            response_id = %request.response_id,
            "chat request accepted"
        );

        let stage = self.generate_and_execute(&request, &prior).await;
        let context = match &stage {
            QueryStage::Executed(result) => prompts::data_context(result),
            QueryStage::ValidationRejected { reason }
            | QueryStage::ExecutionFailed { reason }
            | QueryStage::GenerationFailed { reason } => prompts::failure_context(reason),
        };

        let answer = self.compose_and_stream(&request, &prior, &context, &tx).await;

        thread.append(Message::assistant(answer.clone(), Some(request.response_id.clone())));
        info!(
            event_name = "chat.request.completed",
            thread_id = %request.thread_id,
            response_id = %request.response_id,
            answer_chars = answer.len(),
            "chat turn committed"
        );

        answer
    }

    /// SQL generation pass plus validation and execution. One attempt each;
    /// nothing is retried.
    async fn generate_and_execute(
        &self,
        request: &ChatRequest,
        prior: &[(leadlens_core::Role, String)],
    ) -> QueryStage {
        let mut messages =
            vec![ChatMessage::system(prompts::generation_system_prompt(&self.catalog))];
        let recent = prior.len().saturating_sub(prompts::MAX_CONTEXT_TURNS);
        for (role, content) in &prior[recent..] {
            messages.push(ChatMessage::from_turn(*role, content.clone()));
        }
        messages.push(ChatMessage::user(request.question.clone()));

        let options = ChatOptions::deterministic(&self.models.generation);
        let raw = match self.llm.complete(&messages, &options).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "chat.generate.llm_error",
                    thread_id = %request.thread_id,
                    error = %error,
                    "sql generation pass failed"
                );
                return QueryStage::GenerationFailed {
                    reason: "the query generator was unavailable".to_string(),
                };
            }
        };

        let sql = recover_sql(&raw);
        let outcome = validate_sql(&sql);
        if !outcome.valid {
            let reason =
                outcome.error.unwrap_or_else(|| "the statement was rejected".to_string());
            info!(
                event_name = "chat.validate.rejected",
                thread_id = %request.thread_id,
                reason = %reason,
                "candidate sql rejected before execution"
            );
            return QueryStage::ValidationRejected { reason };
        }

        info!(
            event_name = "chat.execute.start",
            thread_id = %request.thread_id,
            sql = %sql,
            "executing validated query"
        );
        match self.executor.execute(&sql).await {
            Ok(result) => {
                info!(
                    event_name = "chat.execute.succeeded",
                    thread_id = %request.thread_id,
                    row_count = result.row_count,
                    "query returned"
                );
                QueryStage::Executed(result)
            }
            Err(error) => {
                warn!(
                    event_name = "chat.execute.failed",
                    thread_id = %request.thread_id,
                    error = %error,
                    "query execution failed"
                );
                QueryStage::ExecutionFailed { reason: error.to_string() }
            }
        }
    }

    /// Streaming composition pass. Forwards every delta downstream as it
    /// arrives and accumulates the final text for the thread commit.
    async fn compose_and_stream(
        &self,
        request: &ChatRequest,
        prior: &[(leadlens_core::Role, String)],
        context: &str,
        tx: &mpsc::Sender<String>,
    ) -> String {
        let mut messages = vec![ChatMessage::system(prompts::composition_system_prompt())];
        for (role, content) in prior {
            messages.push(ChatMessage::from_turn(*role, content.clone()));
        }
        messages.push(ChatMessage::user(format!("{}{}", request.question, context)));

        let options = ChatOptions::narrative(&self.models.answer);
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);

        let llm = Arc::clone(&self.llm);
        let stream_task =
            tokio::spawn(async move { llm.complete_streaming(&messages, &options, delta_tx).await });

        let mut answer = String::new();
        while let Some(delta) = delta_rx.recv().await {
            // forwarding failure means the caller went away; keep
            // accumulating so the turn still commits
            let _ = tx.send(delta.clone()).await;
            answer.push_str(&delta);
        }

        match stream_task.await {
            Ok(Ok(())) if !answer.is_empty() => answer,
            Ok(Ok(())) => {
                warn!(
                    event_name = "chat.compose.empty_stream",
                    thread_id = %request.thread_id,
                    "composition stream produced no text"
                );
                let _ = tx.send(FALLBACK_ANSWER.to_string()).await;
                FALLBACK_ANSWER.to_string()
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "chat.compose.llm_error",
                    thread_id = %request.thread_id,
                    error = %error,
                    "composition pass failed"
                );
                if answer.is_empty() {
                    let _ = tx.send(FALLBACK_ANSWER.to_string()).await;
                    answer = FALLBACK_ANSWER.to_string();
                }
                answer
            }
            Err(join_error) => {
                warn!(
                    event_name = "chat.compose.task_panic",
                    thread_id = %request.thread_id,
                    error = %join_error,
                    "composition task aborted"
                );
                if answer.is_empty() {
                    let _ = tx.send(FALLBACK_ANSWER.to_string()).await;
                    answer = FALLBACK_ANSWER.to_string();
                }
                answer
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use leadlens_core::{QueryResult, Role};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::{ChatPipeline, ChatRequest, ExecuteError, PipelineModels, QueryExecutor};
    use crate::llm::{ChatClient, ChatMessage, ChatOptions, LlmError};
    use crate::thread::{ThreadStore, ThreadStoreConfig};

    /// First `complete` call returns the scripted generation text; streaming
    /// calls replay scripted deltas. Every prompt is recorded for assertions.
    struct ScriptedLlm {
        generation_reply: String,
        stream_deltas: Vec<String>,
        seen_prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedLlm {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<String, LlmError> {
            self.seen_prompts.lock().expect("lock").push(messages.to_vec());
            Ok(self.generation_reply.clone())
        }

        async fn complete_streaming(
            &self,
            messages: &[ChatMessage],
            _options: &ChatOptions,
            tx: mpsc::Sender<String>,
        ) -> Result<(), LlmError> {
            self.seen_prompts.lock().expect("lock").push(messages.to_vec());
            for delta in &self.stream_deltas {
                let _ = tx.send(delta.clone()).await;
            }
            Ok(())
        }
    }

    struct FixedExecutor {
        result: Result<QueryResult, ExecuteError>,
        executed_sql: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryExecutor for FixedExecutor {
        async fn execute(&self, sql: &str) -> Result<QueryResult, ExecuteError> {
            self.executed_sql.lock().expect("lock").push(sql.to_string());
            self.result.clone()
        }
    }

    fn two_lead_result() -> QueryResult {
        QueryResult {
            sql: "SELECT name, status FROM leads LIMIT 100".to_string(),
            columns: vec!["name".to_string(), "status".to_string()],
            rows: vec![
                json!({"name": "Acme Roofing", "status": "Won"}),
                json!({"name": "Bolt Gutters", "status": "New"}),
            ],
            row_count: 2,
        }
    }

    fn pipeline(
        llm: Arc<ScriptedLlm>,
        executor: Arc<FixedExecutor>,
    ) -> (ChatPipeline, Arc<ThreadStore>) {
        let threads = Arc::new(ThreadStore::new(ThreadStoreConfig::default()));
        let pipeline = ChatPipeline::new(
            llm,
            executor,
            Arc::clone(&threads),
            PipelineModels {
                generation: "gpt-test".to_string(),
                answer: "gpt-test".to_string(),
            },
        );
        (pipeline, threads)
    }

    #[tokio::test]
    async fn end_to_end_streams_answer_and_commits_both_turns() {
        let llm = Arc::new(ScriptedLlm {
            generation_reply: "```sql\nSELECT name, status FROM leads LIMIT 100\n```".to_string(),
            stream_deltas: vec!["You have ".to_string(), "2 leads.".to_string()],
            seen_prompts: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(FixedExecutor {
            result: Ok(two_lead_result()),
            executed_sql: Mutex::new(Vec::new()),
        });
        let (pipeline, threads) = pipeline(Arc::clone(&llm), Arc::clone(&executor));

        let (tx, mut rx) = mpsc::channel(16);
        let answer = pipeline
            .handle(
                ChatRequest {
                    thread_id: "t-1".to_string(),
                    response_id: "resp-1".to_string(),
                    question: "show me my leads".to_string(),
                },
                tx,
            )
            .await;

        let mut streamed = String::new();
        while let Ok(delta) = rx.try_recv() {
            streamed.push_str(&delta);
        }
        assert!(!answer.is_empty());
        assert_eq!(streamed, answer);
        assert_eq!(answer, "You have 2 leads.");

        let history = threads.get_or_create("t-1").history();
        assert_eq!(history.len(), 2, "exactly one user and one assistant message");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "show me my leads");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].response_id.as_deref(), Some("resp-1"));

        let executed = executor.executed_sql.lock().expect("lock");
        assert_eq!(executed.as_slice(), ["SELECT name, status FROM leads LIMIT 100"]);
    }

    #[tokio::test]
    async fn validation_rejection_skips_execution_and_feeds_failure_context() {
        let llm = Arc::new(ScriptedLlm {
            generation_reply: "```sql\nDROP TABLE leads\n```".to_string(),
            stream_deltas: vec!["Could you rephrase that?".to_string()],
            seen_prompts: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(FixedExecutor {
            result: Ok(two_lead_result()),
            executed_sql: Mutex::new(Vec::new()),
        });
        let (pipeline, _threads) = pipeline(Arc::clone(&llm), Arc::clone(&executor));

        let (tx, _rx) = mpsc::channel(16);
        let answer = pipeline
            .handle(
                ChatRequest {
                    thread_id: "t-1".to_string(),
                    response_id: "resp-2".to_string(),
                    question: "drop everything".to_string(),
                },
                tx,
            )
            .await;

        assert!(!answer.is_empty());
        assert!(executor.executed_sql.lock().expect("lock").is_empty(), "no database access");

        let prompts = llm.seen_prompts.lock().expect("lock");
        let composition = prompts.last().expect("composition prompt recorded");
        let user_turn = &composition.last().expect("user turn").content;
        assert!(user_turn.contains("could not be run"));
        assert!(user_turn.contains("ask the user to rephrase"));
    }

    #[tokio::test]
    async fn execution_failure_feeds_failure_context_not_an_error() {
        let llm = Arc::new(ScriptedLlm {
            generation_reply: "SELECT bogus_column FROM leads".to_string(),
            stream_deltas: vec!["I couldn't pull that data.".to_string()],
            seen_prompts: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(FixedExecutor {
            result: Err(ExecuteError::Query("column \"bogus_column\" does not exist".to_string())),
            executed_sql: Mutex::new(Vec::new()),
        });
        let (pipeline, threads) = pipeline(Arc::clone(&llm), Arc::clone(&executor));

        let (tx, _rx) = mpsc::channel(16);
        let answer = pipeline
            .handle(
                ChatRequest {
                    thread_id: "t-9".to_string(),
                    response_id: "resp-3".to_string(),
                    question: "weird question".to_string(),
                },
                tx,
            )
            .await;

        assert_eq!(answer, "I couldn't pull that data.");
        let history = threads.get_or_create("t-9").history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "I couldn't pull that data.");
    }

    #[tokio::test]
    async fn empty_composition_stream_falls_back_and_still_commits() {
        let llm = Arc::new(ScriptedLlm {
            generation_reply: "no sql here at all".to_string(),
            stream_deltas: Vec::new(),
            seen_prompts: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(FixedExecutor {
            result: Ok(two_lead_result()),
            executed_sql: Mutex::new(Vec::new()),
        });
        let (pipeline, threads) = pipeline(Arc::clone(&llm), Arc::clone(&executor));

        let (tx, mut rx) = mpsc::channel(16);
        let answer = pipeline
            .handle(
                ChatRequest {
                    thread_id: "t-2".to_string(),
                    response_id: "resp-4".to_string(),
                    question: "hello".to_string(),
                },
                tx,
            )
            .await;

        assert!(!answer.is_empty(), "fallback text should replace an empty stream");
        assert_eq!(rx.try_recv().ok().as_deref(), Some(answer.as_str()));
        assert_eq!(threads.get_or_create("t-2").history().len(), 2);
    }

    #[tokio::test]
    async fn generation_context_is_truncated_to_recent_turns() {
        let llm = Arc::new(ScriptedLlm {
            generation_reply: "```sql\nSELECT 1 AS one\n```".to_string(),
            stream_deltas: vec!["done".to_string()],
            seen_prompts: Mutex::new(Vec::new()),
        });
        let executor = Arc::new(FixedExecutor {
            result: Ok(two_lead_result()),
            executed_sql: Mutex::new(Vec::new()),
        });
        let (pipeline, threads) = pipeline(Arc::clone(&llm), Arc::clone(&executor));

        let thread = threads.get_or_create("long");
        for i in 0..20 {
            thread.append(leadlens_core::Message::user(format!("old question {i}")));
        }

        let (tx, _rx) = mpsc::channel(16);
        pipeline
            .handle(
                ChatRequest {
                    thread_id: "long".to_string(),
                    response_id: "resp-5".to_string(),
                    question: "latest".to_string(),
                },
                tx,
            )
            .await;

        let prompts = llm.seen_prompts.lock().expect("lock");
        let generation = prompts.first().expect("generation prompt recorded");
        // system + 8 context turns + current question
        assert_eq!(generation.len(), 1 + crate::prompts::MAX_CONTEXT_TURNS + 1);
        assert!(generation[1].content.contains("old question 12"));
    }
}
