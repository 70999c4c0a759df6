//! End-to-end exercise of the vector pipeline: full clustering over a
//! 250-topic corpus, incremental assignment of late arrivals, and a
//! similarity query that must surface a known near-duplicate pair.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use draftmill::vector::{
    CentroidStore, ClusterId, EmbeddingSource, PipelineOptions, TopicId, VectorDimension,
    VectorError, VectorPipeline,
};

const DIM: usize = 8;

/// In-memory embedding store standing in for the host system.
#[derive(Default)]
struct MemorySource {
    rows: Mutex<HashMap<TopicId, (Vec<f32>, Option<ClusterId>)>>,
}

impl MemorySource {
    fn insert(&self, id: u64, vector: Vec<f32>) {
        self.rows
            .lock()
            .insert(TopicId::new_unchecked(id), (vector, None));
    }

    fn cluster_of(&self, id: u64) -> Option<ClusterId> {
        self.rows
            .lock()
            .get(&TopicId::new_unchecked(id))
            .and_then(|(_, c)| *c)
    }
}

impl EmbeddingSource for MemorySource {
    fn fetch_all(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        let mut all: Vec<_> = self
            .rows
            .lock()
            .iter()
            .map(|(id, (v, _))| (*id, v.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        Ok(all)
    }

    fn fetch_unclustered(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        let mut pending: Vec<_> = self
            .rows
            .lock()
            .iter()
            .filter(|(_, (_, cluster))| cluster.is_none())
            .map(|(id, (v, _))| (*id, v.clone()))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        Ok(pending)
    }

    fn fetch_vector(&self, id: TopicId) -> Result<Option<Vec<f32>>, VectorError> {
        Ok(self.rows.lock().get(&id).map(|(v, _)| v.clone()))
    }

    fn fetch_candidates(
        &self,
        clusters: &[ClusterId],
    ) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|(_, (_, cluster))| cluster.map(|c| clusters.contains(&c)).unwrap_or(false))
            .map(|(id, (v, _))| (*id, v.clone()))
            .collect())
    }

    fn persist_assignment(&self, id: TopicId, cluster: ClusterId) -> Result<(), VectorError> {
        let mut rows = self.rows.lock();
        let row = rows.get_mut(&id).ok_or(VectorError::EmbeddingNotFound(id))?;
        row.1 = Some(cluster);
        Ok(())
    }
}

/// 250 embeddings: ids 1 and 2 are a near-duplicate pair off in their own
/// direction; ids 3..=250 spread across three axis-aligned groups.
fn build_corpus(source: &MemorySource) {
    source.insert(1, vec![0.7, 0.7, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
    source.insert(2, vec![0.7, 0.7, 0.1, 0.01, 0.0, 0.0, 0.0, 0.0]);

    for i in 3u64..=250 {
        let group = (i % 3) as usize;
        let t = i as f32 * 0.37;

        let mut vector = vec![0.0f32; DIM];
        vector[group] = 1.0;
        vector[3] = 0.35 * t.sin();
        vector[4] = 0.35 * t.cos();
        vector[5] = 0.2 * (2.0 * t).sin();
        source.insert(i, vector);
    }
}

fn pipeline(dir: &TempDir) -> VectorPipeline<Arc<MemorySource>> {
    let source = Arc::new(MemorySource::default());
    build_corpus(source.as_ref());
    VectorPipeline::new(
        source,
        CentroidStore::new(dir.path().join("centroids.bin")),
        VectorDimension::new(DIM).unwrap(),
        PipelineOptions::default(),
    )
}

#[test]
fn full_run_assigns_every_embedding_a_valid_cluster() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    let summary = pipeline.trigger_clustering(Some(3)).unwrap();
    assert_eq!(summary.k, 3);
    assert_eq!(summary.assigned, 250);

    for id in 1..=250u64 {
        let cluster = pipeline
            .source()
            .cluster_of(id)
            .unwrap_or_else(|| panic!("topic {id} was not assigned"));
        assert!(cluster.index() < 3, "topic {id} got cluster {cluster}");
    }
}

#[test]
fn near_duplicate_pair_is_each_others_top_result() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.trigger_clustering(Some(3)).unwrap();

    for (query, twin) in [(1u64, 2u64), (2, 1)] {
        let results = pipeline
            .find_similar(TopicId::new_unchecked(query), 5)
            .unwrap();

        assert!(!results.is_empty(), "no results for topic {query}");
        assert_eq!(results[0].id.get(), twin, "twin not top for {query}");
        assert!(results[0].similarity.get() > 0.8);

        // Results strictly descending, query never among them
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert!(results.iter().all(|r| r.id.get() != query));
        assert!(results.iter().all(|r| r.similarity.get() > 0.8));
    }
}

#[test]
fn incremental_assignment_folds_in_late_arrivals() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    pipeline.trigger_clustering(Some(3)).unwrap();

    // New embeddings arrive after the full run, one per group direction
    pipeline
        .source()
        .insert(900, vec![0.95, 0.0, 0.05, 0.1, 0.0, 0.0, 0.0, 0.0]);
    pipeline
        .source()
        .insert(901, vec![0.0, 1.05, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0]);

    let assigned = pipeline.assign_unclustered().unwrap();
    assert_eq!(assigned, 2);

    for id in [900u64, 901] {
        let cluster = pipeline.source().cluster_of(id).expect("assigned");
        assert!(cluster.index() < 3);
    }

    // Existing assignments were not disturbed
    let counts = pipeline.source().fetch_unclustered().unwrap();
    assert!(counts.is_empty());
}

#[test]
fn clustering_is_reproducible_for_a_fixed_seed() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let pipeline_a = pipeline(&dir_a);
    let pipeline_b = pipeline(&dir_b);

    pipeline_a.trigger_clustering(Some(3)).unwrap();
    pipeline_b.trigger_clustering(Some(3)).unwrap();

    for id in 1..=250u64 {
        assert_eq!(
            pipeline_a.source().cluster_of(id),
            pipeline_b.source().cluster_of(id),
            "divergent assignment for topic {id}"
        );
    }
}
