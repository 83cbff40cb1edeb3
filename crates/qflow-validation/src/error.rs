//! Converting a pipeline's verdict into [`qflow_error::QflowError`].

use qflow_error::QflowError;

use crate::layer::LayerStatus;
use crate::pipeline::PipelineReport;

impl PipelineReport {
    /// `Ok(())` if [`PipelineReport::overall_status`] is not `Failed`.
    /// Otherwise, an error built from the first failing layer: required
    /// layers map to `VALIDATION::REQUIRED_LAYER_FAILED` (fatal), optional
    /// ones to `VALIDATION::LAYER_FAILED`.
    pub fn into_result(self) -> Result<Self, QflowError> {
        if self.overall_status != LayerStatus::Failed {
            return Ok(self);
        }

        let failing = self
            .per_layer_results
            .iter()
            .find(|outcome| outcome.result.status == LayerStatus::Failed);

        let Some(failing) = failing else {
            return Ok(self);
        };

        let reason = failing
            .result
            .message
            .clone()
            .unwrap_or_else(|| "layer failed".to_string());

        let err = if self.short_circuited {
            QflowError::required_layer_failed(failing.layer_id.to_string(), reason)
        } else {
            QflowError::new(qflow_error::ErrorKind::from(
                qflow_error::ValidationError::LayerFailed {
                    layer: failing.layer_id.to_string(),
                    reason,
                },
            ))
        };
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerResult;
    use crate::pipeline::LayerOutcome;
    use qflow_core::ValidationLayerId;
    use std::time::Duration;

    fn report(status: LayerStatus, short_circuited: bool) -> PipelineReport {
        PipelineReport {
            overall_status: status,
            per_layer_results: vec![LayerOutcome {
                layer_id: ValidationLayerId::v4(),
                result: LayerResult {
                    status,
                    message: Some("nope".to_string()),
                    duration: Duration::from_millis(1),
                },
                from_cache: false,
            }],
            total_duration: Duration::from_millis(1),
            cache_hits: 0,
            cache_misses: 1,
            short_circuited,
        }
    }

    #[test]
    fn passing_report_converts_to_ok() {
        assert!(report(LayerStatus::Passed, false).into_result().is_ok());
    }

    #[test]
    fn short_circuited_failure_is_fatal() {
        let err = report(LayerStatus::Failed, true).into_result().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code(), "REQUIRED_LAYER_FAILED");
    }

    #[test]
    fn non_short_circuited_failure_is_not_fatal() {
        let err = report(LayerStatus::Failed, false)
            .into_result()
            .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.code(), "LAYER_FAILED");
    }
}
