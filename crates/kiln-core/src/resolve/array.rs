use kiln_model::{ArrayPlan, ArraySpec, ErrorCode, Indexer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    #[error("unknown array indexer '{0}'")]
    UnknownIndexer(String),
    #[error("an array counter requires the counter indexer")]
    CounterWithoutIndexer,
    #[error("array counter must not be negative, got {0}")]
    NegativeCounter(i64),
    #[error("invalid replica count {0}")]
    InvalidReplicas(i64),
}

impl ArrayError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidJobArray
    }
}

fn parse_indexer(name: &str) -> Result<Indexer, ArrayError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "index" | "contiguous" => Ok(Indexer::Contiguous),
        "counter" => Ok(Indexer::Counter),
        _ => Err(ArrayError::UnknownIndexer(name.to_string())),
    }
}

/// Turn raw array fields into a plan.
///
/// Rules are applied in order and the first violation is returned.
pub fn plan_array(spec: &ArraySpec) -> Result<ArrayPlan, ArrayError> {
    let indexer = spec.indexer.as_deref().map(parse_indexer).transpose()?;

    if spec.counter.is_some() && indexer != Some(Indexer::Counter) {
        return Err(ArrayError::CounterWithoutIndexer);
    }
    if let Some(counter) = spec.counter.filter(|c| *c < 0) {
        return Err(ArrayError::NegativeCounter(counter));
    }

    let replicas = match spec.replicas {
        None | Some(1) => return Ok(ArrayPlan::single()),
        Some(n) if n <= 0 => return Err(ArrayError::InvalidReplicas(n)),
        Some(n) => u32::try_from(n).map_err(|_| ArrayError::InvalidReplicas(n))?,
    };

    let indexer = indexer.unwrap_or(Indexer::Contiguous);
    let counter_start = match indexer {
        Indexer::Counter => spec.counter.and_then(|c| u64::try_from(c).ok()).unwrap_or(0),
        Indexer::Contiguous => 0,
    };

    Ok(ArrayPlan {
        replicas,
        indexer: Some(indexer),
        counter_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(replicas: Option<i64>, indexer: Option<&str>, counter: Option<i64>) -> ArraySpec {
        ArraySpec {
            replicas,
            indexer: indexer.map(str::to_string),
            counter,
        }
    }

    #[test]
    fn absent_or_one_replica_is_identity() {
        assert_eq!(plan_array(&spec(None, None, None)).unwrap(), ArrayPlan::single());
        assert_eq!(
            plan_array(&spec(Some(1), Some("index"), None)).unwrap(),
            ArrayPlan::single()
        );
    }

    #[test]
    fn contiguous_indices() {
        let plan = plan_array(&spec(Some(5), None, None)).unwrap();
        assert_eq!(plan.indices(), vec![0, 1, 2, 3, 4]);
        assert_eq!(plan.indexer, Some(Indexer::Contiguous));
    }

    #[test]
    fn counter_indexer_offsets_indices() {
        let plan = plan_array(&spec(Some(3), Some("counter"), Some(40))).unwrap();
        assert_eq!(plan.indices(), vec![40, 41, 42]);
    }

    #[test]
    fn non_positive_replicas_are_rejected() {
        assert_eq!(
            plan_array(&spec(Some(0), None, None)).unwrap_err(),
            ArrayError::InvalidReplicas(0)
        );
        assert!(plan_array(&spec(Some(-2), None, None)).is_err());
        assert!(plan_array(&spec(Some(i64::MAX), None, None)).is_err());
    }

    #[test]
    fn rules_apply_in_order() {
        // unknown indexer wins over bad replicas
        assert!(matches!(
            plan_array(&spec(Some(0), Some("random"), None)),
            Err(ArrayError::UnknownIndexer(_))
        ));
        assert_eq!(
            plan_array(&spec(Some(2), Some("index"), Some(1))).unwrap_err(),
            ArrayError::CounterWithoutIndexer
        );
        assert_eq!(
            plan_array(&spec(Some(0), Some("counter"), Some(-1))).unwrap_err(),
            ArrayError::NegativeCounter(-1)
        );
    }

    #[test]
    fn every_error_is_an_array_error_code() {
        let err = plan_array(&spec(Some(0), None, None)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidJobArray);
    }
}
