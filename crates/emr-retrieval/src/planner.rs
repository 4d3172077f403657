//! Graph-mode question answering via generated Cypher.
//!
//! The generated statement is untrusted input: it is validated read-only
//! against a closed keyword denylist before execution, execution is
//! bounded by the graph client timeout, and any failure surfaces as a
//! typed error carrying the offending statement. Failures are never
//! auto-retried; each retry would consume another model call, so the
//! caller decides whether to re-ask.

use neo4rs::Query;
use tracing::debug;

use emr_core::{EngineError, EngineResult};
use emr_graph::{schema_summary, GraphClient};

use crate::synthesis::ChatClient;

const CYPHER_SYSTEM_PROMPT: &str = "You translate clinical questions into a single read-only \
    Cypher statement. Use only the node labels, relationship types, and property keys provided. \
    Return the statement alone: no prose, no code fences.";

const ANSWER_SYSTEM_PROMPT: &str = "You are a clinical QA assistant. Answer the question using \
    only the provided query result rows. If the rows are empty, say that no data was found.";

/// Clauses that would mutate the store. `CALL` is included because a write
/// *procedure* (e.g. apoc) carries no write clause of its own; the planner
/// generates plain MATCH queries, so rejecting procedures loses nothing.
/// The statement is tokenized on identifier boundaries, so property names
/// containing these words (e.g. `offset`, `reset`) do not false-positive.
const WRITE_KEYWORDS: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "FOREACH", "LOAD", "CALL",
];

/// One planning step: the executed statement and its serialized rows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanStep {
    pub statement: String,
    pub result_rows: String,
}

/// A graph-mode answer with its debugging trace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphAnswer {
    pub answer: String,
    pub trace: Vec<PlanStep>,
}

/// Question answering by planning Cypher against the live schema.
pub struct GraphPlanner {
    graph: GraphClient,
    chat: ChatClient,
}

impl GraphPlanner {
    pub fn new(graph: GraphClient, chat: ChatClient) -> Self {
        Self { graph, chat }
    }

    /// Answer a question by generating and executing one Cypher statement.
    ///
    /// The optional patient filter is applied by instructing the generator
    /// to constrain the statement, not by post-filtering results.
    pub async fn answer(
        &self,
        question: &str,
        patient_ids: Option<&[String]>,
    ) -> EngineResult<GraphAnswer> {
        let schema = schema_summary(&self.graph).await?;

        let mut prompt = format!(
            "Graph schema:\n{}\n\nQuestion: {}",
            schema.render(),
            question
        );
        if let Some(ids) = patient_ids.filter(|ids| !ids.is_empty()) {
            let list = ids
                .iter()
                .map(|id| format!("'{}'", id.replace('\'', "")))
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&format!(
                "\n\nConstrain the statement to nodes whose patient_id is one of: [{}].",
                list
            ));
        }

        // Temperature 0: query generation wants determinism, not variety.
        let generated = self.chat.complete(CYPHER_SYSTEM_PROMPT, &prompt, Some(0.0)).await?;
        let statement = extract_statement(&generated);
        debug!(statement = %statement, "Generated Cypher");

        validate_read_only(&statement)?;

        let rows = self
            .graph
            .query_json(Query::new(statement.clone()))
            .await
            .map_err(|e| EngineError::query_plan(statement.clone(), e.to_string()))?;
        let result_rows = serde_json::to_string(&rows)?;

        let answer = self
            .chat
            .complete_with_fallback(
                ANSWER_SYSTEM_PROMPT,
                &format!("Question:\n{}\n\nQuery result rows:\n{}", question, result_rows),
            )
            .await?;

        Ok(GraphAnswer {
            answer,
            trace: vec![PlanStep {
                statement,
                result_rows,
            }],
        })
    }
}

/// Strip code fences and language tags the model may wrap the statement in.
pub(crate) fn extract_statement(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner
        .strip_prefix("cypher")
        .or_else(|| inner.strip_prefix("Cypher"))
        .unwrap_or(inner);
    inner.trim().to_string()
}

/// Reject statements containing any write clause.
pub(crate) fn validate_read_only(statement: &str) -> EngineResult<()> {
    if statement.is_empty() {
        return Err(EngineError::query_plan(statement, "empty statement"));
    }

    for token in statement.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
        let upper = token.to_ascii_uppercase();
        if WRITE_KEYWORDS.contains(&upper.as_str()) {
            return Err(EngineError::query_plan(
                statement,
                format!("write clause '{}' rejected", upper),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_statements_are_unwrapped() {
        let raw = "```cypher\nMATCH (p:Patient) RETURN p.patient_id\n```";
        assert_eq!(extract_statement(raw), "MATCH (p:Patient) RETURN p.patient_id");

        let bare = "MATCH (n) RETURN n LIMIT 5";
        assert_eq!(extract_statement(bare), bare);
    }

    #[test]
    fn read_statements_pass_validation() {
        validate_read_only("MATCH (p:Patient)-[:HAS_VALUE]->(v) RETURN v.value LIMIT 10").unwrap();
        // Identifiers containing a denylisted word are not write clauses.
        validate_read_only("MATCH (n) WHERE n.offset > 1 RETURN n SKIP 2").unwrap();
    }

    #[test]
    fn write_statements_are_rejected_with_the_statement_attached() {
        let statement = "MERGE (p:Patient {patient_id: 'x'}) RETURN p";
        let err = validate_read_only(statement).unwrap_err();
        match err {
            EngineError::QueryPlan { statement: s, reason } => {
                assert_eq!(s, statement);
                assert!(reason.contains("MERGE"));
            }
            other => panic!("expected QueryPlan error, got {:?}", other),
        }
    }

    #[test]
    fn delete_and_set_are_rejected() {
        assert!(validate_read_only("MATCH (n) DETACH DELETE n").is_err());
        assert!(validate_read_only("MATCH (n) SET n.x = 1 RETURN n").is_err());
        assert!(validate_read_only("").is_err());
    }

    #[test]
    fn procedure_calls_are_rejected() {
        assert!(validate_read_only(
            "CALL apoc.create.node(['Patient'], {}) YIELD node RETURN node"
        )
        .is_err());
    }
}
