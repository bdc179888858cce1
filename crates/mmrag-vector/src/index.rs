use std::cmp::Ordering;

use tracing::debug;

use mmrag_core::error::{Error, Result};
use mmrag_core::types::{EmbeddingRecord, RecordMetadata, SearchHit};

/// Flat, append-only vector index.
///
/// Row `i` of `vectors` (a row-major `len * dimension` buffer) belongs to
/// `metadata[i]`. Rows are never reordered or removed; a rebuild replaces the
/// whole index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    pub(crate) dimension: usize,
    pub(crate) vectors: Vec<f32>,
    pub(crate) metadata: Vec<RecordMetadata>,
}

impl VectorIndex {
    pub fn create(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfiguration("index dimension must be greater than zero".into()));
        }
        Ok(Self { dimension, vectors: Vec::new(), metadata: Vec::new() })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn metadata(&self) -> &[RecordMetadata] {
        &self.metadata
    }

    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        (i < self.len()).then(|| &self.vectors[i * self.dimension..(i + 1) * self.dimension])
    }

    /// Rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], &RecordMetadata)> {
        self.vectors.chunks_exact(self.dimension).zip(self.metadata.iter())
    }

    /// Append a batch. Either every row is added or, on error, none is.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>, metadata: Vec<RecordMetadata>) -> Result<()> {
        if vectors.len() != metadata.len() {
            return Err(Error::batch_length(vectors.len(), metadata.len()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::dimension(self.dimension, bad.len()));
        }
        self.vectors.reserve(vectors.len() * self.dimension);
        for v in &vectors {
            self.vectors.extend_from_slice(v);
        }
        self.metadata.extend(metadata);
        debug!(added = vectors.len(), total = self.len(), "vectors appended");
        Ok(())
    }

    pub fn add_record(&mut self, record: EmbeddingRecord) -> Result<()> {
        self.add(vec![record.vector], vec![record.metadata])
    }

    /// Exact nearest neighbours by squared Euclidean distance, nearest first.
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Error::dimension(self.dimension, query.len()));
        }
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .map(|(i, d)| (d, i))
            .collect();
        if top_k < scored.len() {
            scored.select_nth_unstable_by(top_k - 1, by_distance_then_position);
            scored.truncate(top_k);
        }
        scored.sort_unstable_by(by_distance_then_position);

        Ok(scored
            .into_iter()
            .map(|(distance, i)| SearchHit { distance, metadata: self.metadata[i].clone() })
            .collect())
    }
}

fn by_distance_then_position(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mmrag_core::error::Mismatch;
    use mmrag_core::types::Meta;
    use uuid::Uuid;

    fn meta(source: &str, chunk_index: usize) -> RecordMetadata {
        RecordMetadata {
            uuid: Uuid::new_v4(),
            timestamp: Utc::now(),
            filetype: "md".into(),
            source_file: source.into(),
            chunk_index,
            text: format!("{source}#{chunk_index}"),
            extra: Meta::new(),
        }
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(VectorIndex::create(0), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = VectorIndex::create(3).expect("create");
        assert!(index.search(&[0.0, 0.0, 0.0], 5).expect("search").is_empty());
    }

    #[test]
    fn batch_length_mismatch_leaves_index_untouched() {
        let mut index = VectorIndex::create(2).expect("create");
        index.add(vec![vec![1.0, 1.0]], vec![meta("a.md", 0)]).expect("seed");
        let before = index.clone();

        let err = index.add(vec![vec![0.0, 0.0], vec![1.0, 0.0]], vec![meta("b.md", 0)]).expect_err("len");
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1, of: Mismatch::BatchLength }));
        assert!(err.to_string().contains("2 vectors vs 1 metadata records"), "{err}");
        let err = index.add(vec![vec![0.0, 0.0], vec![1.0]], vec![meta("b.md", 0), meta("b.md", 1)]).expect_err("dim");
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1, of: Mismatch::VectorLength }));
        assert_eq!(index, before);
    }

    #[test]
    fn wrong_query_dimension_is_rejected() {
        let index = VectorIndex::create(2).expect("create");
        assert!(matches!(index.search(&[1.0], 1), Err(Error::DimensionMismatch { expected: 2, actual: 1, .. })));
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let mut index = VectorIndex::create(1).expect("create");
        for (i, x) in [5.0f32, 1.0, 3.0, 2.0, 4.0].into_iter().enumerate() {
            index.add(vec![vec![x]], vec![meta("n.md", i)]).expect("add");
        }
        let hits = index.search(&[0.0], 3).expect("search");
        let order: Vec<usize> = hits.iter().map(|h| h.metadata.chunk_index).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(index.search(&[0.0], 50).expect("search").len(), 5);
        assert!(index.search(&[0.0], 0).expect("search").is_empty());
    }

    #[test]
    fn each_distinct_row_is_its_own_nearest_neighbour() {
        let rows = vec![vec![0.1, 0.9, -0.3], vec![2.0, 0.0, 1.0], vec![-1.5, 0.2, 0.2], vec![0.1, 0.8, -0.3]];
        let mut index = VectorIndex::create(3).expect("create");
        let metas: Vec<RecordMetadata> = (0..rows.len()).map(|i| meta("rows.md", i)).collect();
        index.add(rows.clone(), metas).expect("add");

        for (i, row) in rows.iter().enumerate() {
            let hits = index.search(row, 1).expect("search");
            assert_eq!(hits[0].metadata.chunk_index, i);
            assert_eq!(hits[0].distance, 0.0);
        }
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = VectorIndex::create(2).expect("create");
        for i in 0..6 {
            index.add(vec![vec![1.0, 0.0]], vec![meta("same.md", i)]).expect("add");
        }
        let hits = index.search(&[0.0, 0.0], 4).expect("search");
        let order: Vec<usize> = hits.iter().map(|h| h.metadata.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn rows_stay_paired_with_metadata() {
        let mut index = VectorIndex::create(2).expect("create");
        index
            .add(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![meta("a.md", 0), meta("a.md", 1)])
            .expect("add");
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.vector(2), None);
        let pairs: Vec<(Vec<f32>, usize)> = index.iter().map(|(v, m)| (v.to_vec(), m.chunk_index)).collect();
        assert_eq!(pairs, vec![(vec![1.0, 2.0], 0), (vec![3.0, 4.0], 1)]);
    }
}
