//! Embedding rows and cosine similarity search.

use async_trait::async_trait;
use pgvector::Vector;

use super::{EmbeddingStore, PgRepository};
use crate::error::Result;
use crate::models::EmbeddingMatch;

#[async_trait]
impl EmbeddingStore for PgRepository {
    async fn insert_embedding(
        &self,
        incident_id: &str,
        summary: &str,
        model: &str,
        vector: &[f32],
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO embeddings (incident_id, incident_summary, embedding, model)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(incident_id)
        .bind(summary)
        .bind(Vector::from(vector.to_vec()))
        .bind(model)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn search_embeddings(&self, vector: &[f32], limit: i64) -> Result<Vec<EmbeddingMatch>> {
        let rows = sqlx::query_as::<_, (String, String, f64)>(
            r#"
            SELECT incident_id, incident_summary, 1 - (embedding <=> $1) AS similarity
            FROM embeddings
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(Vector::from(vector.to_vec()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(incident_id, incident_summary, similarity)| EmbeddingMatch {
                incident_id,
                incident_summary,
                similarity,
            })
            .collect())
    }
}
