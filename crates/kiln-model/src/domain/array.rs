use serde::{Deserialize, Serialize};

/// Raw array-job fields of a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArraySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<i64>,
}

/// How each replica of an array job learns its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Indexer {
    /// Zero-based contiguous index.
    Contiguous,
    /// Index offset by an externally supplied counter start.
    Counter,
}

/// Resolved array layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayPlan {
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer: Option<Indexer>,
    pub counter_start: u64,
}

impl ArrayPlan {
    /// The plan of a job that is not an array job.
    pub fn single() -> Self {
        Self {
            replicas: 1,
            indexer: None,
            counter_start: 0,
        }
    }

    pub fn is_array(&self) -> bool {
        self.indexer.is_some()
    }

    /// Per-replica index values; empty for a non-array job.
    pub fn indices(&self) -> Vec<u64> {
        match self.indexer {
            None => Vec::new(),
            Some(Indexer::Contiguous) => (0..u64::from(self.replicas)).collect(),
            Some(Indexer::Counter) => {
                let start = self.counter_start;
                (start..start + u64::from(self.replicas)).collect()
            }
        }
    }
}

impl Default for ArrayPlan {
    fn default() -> Self {
        Self::single()
    }
}
