//! Thin adapter around `qdrant-client` for the remote index backend.
//!
//! All Qdrant API usage lives here, behind [`VectorIndex`], so the rest
//! of the crate never sees the builder-heavy client API. The collection
//! is created lazily from the first inserted batch's vector size.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QValue, VectorParamsBuilder, value::Kind as QKind,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::IndexError;
use crate::memory_index::{IndexPoint, VectorIndex};
use crate::record::RetrievalHit;

/// Connection settings for the remote backend.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantSettings {
    /// Reads `QDRANT_URL`, `QDRANT_API_KEY`, `QDRANT_COLLECTION` with
    /// local defaults.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".into()),
            api_key: std::env::var("QDRANT_API_KEY").ok().filter(|s| !s.is_empty()),
            collection: std::env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "equiqa".into()),
        }
    }
}

/// Qdrant-backed [`VectorIndex`].
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
    collection_ready: bool,
    count: usize,
}

impl QdrantIndex {
    /// Builds the client; no network call happens until first use.
    ///
    /// # Errors
    /// [`IndexError::InvalidConfig`] for an unusable URL.
    pub fn new(settings: &QdrantSettings, dimension: usize) -> Result<Self, IndexError> {
        let mut builder = Qdrant::from_url(&settings.url);
        if let Some(key) = &settings.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::InvalidConfig(format!("qdrant client: {e}")))?;
        Ok(Self {
            client,
            collection: settings.collection.clone(),
            dimension,
            collection_ready: false,
            count: 0,
        })
    }

    async fn ensure_collection(&mut self) -> Result<(), IndexError> {
        if self.collection_ready {
            return Ok(());
        }
        match self.client.collection_info(&self.collection).await {
            Ok(_) => {
                debug!("collection '{}' already exists", self.collection);
            }
            Err(err) => {
                warn!(
                    "collection '{}' not found, creating (error={err})",
                    self.collection
                );
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&self.collection).vectors_config(
                            VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                        ),
                    )
                    .await
                    .map_err(|e| IndexError::Qdrant(e.to_string()))?;
                info!(
                    "collection '{}' created with size={}",
                    self.collection, self.dimension
                );
            }
        }
        self.collection_ready = true;
        Ok(())
    }
}

fn qstring(s: &str) -> QValue {
    QValue {
        kind: Some(QKind::StringValue(s.to_string())),
    }
}

fn qint(i: i64) -> QValue {
    QValue {
        kind: Some(QKind::IntegerValue(i)),
    }
}

fn payload_str(payload: &HashMap<String, QValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(QKind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, QValue>, key: &str) -> Option<i64> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(QKind::IntegerValue(i)) => Some(*i),
        _ => None,
    }
}

impl VectorIndex for QdrantIndex {
    fn insert<'a>(
        &'a mut self,
        points: Vec<IndexPoint>,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>> {
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            for p in &points {
                if p.vector.len() != self.dimension {
                    return Err(IndexError::VectorSizeMismatch {
                        got: p.vector.len(),
                        want: self.dimension,
                    });
                }
            }
            self.ensure_collection().await?;

            let inserted = points.len();
            let pts: Vec<PointStruct> = points
                .into_iter()
                .map(|p| {
                    let mut payload: HashMap<String, QValue> = HashMap::new();
                    payload.insert("text".into(), qstring(&p.chunk.text));
                    payload.insert("token_count".into(), qint(p.chunk.token_count as i64));
                    payload.insert(
                        "document_id".into(),
                        qstring(&p.chunk.document_id.to_string()),
                    );
                    if let Some(src) = &p.source {
                        payload.insert("source".into(), qstring(src));
                    }
                    PointStruct::new(
                        p.chunk.id.to_string(),
                        p.vector,
                        Payload::from(payload),
                    )
                })
                .collect();

            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, pts))
                .await
                .map_err(|e| IndexError::Qdrant(e.to_string()))?;
            self.count += inserted;
            debug!(inserted, total = self.count, "qdrant upsert complete");
            Ok(())
        })
    }

    fn search<'a>(
        &'a self,
        query: &'a [f32],
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RetrievalHit>, IndexError>> + Send + 'a>>
    {
        Box::pin(async move {
            if k == 0 {
                return Err(IndexError::InvalidArgument("k must be > 0".into()));
            }
            if query.len() != self.dimension {
                return Err(IndexError::VectorSizeMismatch {
                    got: query.len(),
                    want: self.dimension,
                });
            }
            if !self.collection_ready {
                // Nothing ingested yet through this handle.
                return Ok(Vec::new());
            }

            let res = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&self.collection, query.to_vec(), k as u64)
                        .with_payload(true),
                )
                .await
                .map_err(|e| IndexError::Qdrant(e.to_string()))?;

            let mut hits = Vec::with_capacity(res.result.len());
            for r in res.result {
                let chunk_id = match r.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(s)) => Uuid::parse_str(&s)
                        .map_err(|e| IndexError::Qdrant(format!("bad point id: {e}")))?,
                    other => {
                        return Err(IndexError::Qdrant(format!(
                            "unexpected point id variant: {other:?}"
                        )));
                    }
                };
                hits.push(RetrievalHit {
                    chunk_id,
                    score: r.score,
                    text: payload_str(&r.payload, "text").unwrap_or_default(),
                    token_count: payload_int(&r.payload, "token_count").unwrap_or(0) as usize,
                    source: payload_str(&r.payload, "source"),
                });
            }
            Ok(hits)
        })
    }

    fn delete_all<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<(), IndexError>> + Send + 'a>> {
        Box::pin(async move {
            if self.collection_ready || self.count > 0 {
                self.client
                    .delete_collection(&self.collection)
                    .await
                    .map_err(|e| IndexError::Qdrant(e.to_string()))?;
                info!("collection '{}' deleted", self.collection);
            }
            self.collection_ready = false;
            self.count = 0;
            Ok(())
        })
    }

    fn len(&self) -> usize {
        self.count
    }
}
