use std::sync::Arc;

use bitflags::bitflags;
use strato_gpu::GpuDevice;
use strato_gpu::{GpuQuery, PipelineStatistics, QueryData, QueryKind};
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Raw query kind codes as they appear in descriptors.
pub mod d3d10 {
    pub const QUERY_EVENT: u32 = 0;
    pub const QUERY_OCCLUSION: u32 = 1;
    pub const QUERY_TIMESTAMP: u32 = 2;
    pub const QUERY_TIMESTAMP_DISJOINT: u32 = 3;
    pub const QUERY_PIPELINE_STATISTICS: u32 = 4;
    pub const QUERY_OCCLUSION_PREDICATE: u32 = 5;
    pub const QUERY_SO_STATISTICS: u32 = 6;
    pub const QUERY_SO_OVERFLOW_PREDICATE: u32 = 7;

    pub const QUERY_MISC_PREDICATEHINT: u32 = 0x1;
}

bitflags! {
    /// Flags accepted when polling a query for data.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct GetDataFlags: u32 {
        const DO_NOT_FLUSH = 0x1;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryDesc {
    pub query: u32,
    pub misc_flags: u32,
}

/// The value a completed query reports to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryResult {
    Event,
    Occlusion(u64),
    OcclusionPredicate(bool),
    Timestamp(u64),
    TimestampDisjoint { frequency: u64, disjoint: bool },
    PipelineStatistics(PipelineStatistics),
}

/// Timestamps count backend ticks rather than a wall clock, so the
/// reported frequency is nominal.
const TIMESTAMP_FREQUENCY: u64 = 1000;

/// An asynchronous query. Disjoint timestamp queries have no backend
/// object, their data is synthesized on poll.
pub struct Query {
    kind: u32,
    gpu: Option<Arc<dyn GpuQuery>>,
}

impl Query {
    pub(crate) fn new(gpu: &Arc<dyn GpuDevice>, desc: &QueryDesc) -> ApiResult<Self> {
        let backend_kind = match desc.query {
            d3d10::QUERY_EVENT => Some(QueryKind::Event),
            d3d10::QUERY_OCCLUSION => Some(QueryKind::Occlusion { precise: true }),
            d3d10::QUERY_OCCLUSION_PREDICATE => Some(QueryKind::Occlusion { precise: false }),
            d3d10::QUERY_TIMESTAMP => Some(QueryKind::Timestamp),
            d3d10::QUERY_TIMESTAMP_DISJOINT => None,
            d3d10::QUERY_PIPELINE_STATISTICS => Some(QueryKind::PipelineStatistics),
            other => {
                warn!(kind = other, "unsupported query kind");
                return Err(ApiError::invalid_arg(format!(
                    "unsupported query kind {other}"
                )));
            }
        };

        let gpu_query = match backend_kind {
            Some(kind) => Some(gpu.create_query(kind)?),
            None => None,
        };

        Ok(Self {
            kind: desc.query,
            gpu: gpu_query,
        })
    }

    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub(crate) fn gpu_query(&self) -> Option<&Arc<dyn GpuQuery>> {
        self.gpu.as_ref()
    }

    /// Scoped queries bracket commands with begin and end. Event and
    /// timestamp queries only ever record at their end point.
    pub(crate) fn is_scoped(&self) -> bool {
        matches!(
            self.kind,
            d3d10::QUERY_OCCLUSION
                | d3d10::QUERY_OCCLUSION_PREDICATE
                | d3d10::QUERY_PIPELINE_STATISTICS
        )
    }

    /// The query's result, or `None` while the backend has not
    /// resolved it yet.
    pub fn data(&self) -> Option<QueryResult> {
        let gpu = match &self.gpu {
            Some(gpu) => gpu,
            None => {
                return Some(QueryResult::TimestampDisjoint {
                    frequency: TIMESTAMP_FREQUENCY,
                    disjoint: false,
                })
            }
        };

        gpu.data().map(|data| match data {
            QueryData::Event => QueryResult::Event,
            QueryData::Occlusion { samples_passed } => {
                if self.kind == d3d10::QUERY_OCCLUSION_PREDICATE {
                    QueryResult::OcclusionPredicate(samples_passed != 0)
                } else {
                    QueryResult::Occlusion(samples_passed)
                }
            }
            QueryData::Timestamp { ticks } => QueryResult::Timestamp(ticks),
            QueryData::PipelineStatistics(stats) => QueryResult::PipelineStatistics(stats),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strato_gpu::trace::TraceDevice;

    #[test]
    fn stream_output_queries_are_rejected() {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let result = Query::new(
            &gpu,
            &QueryDesc {
                query: d3d10::QUERY_SO_STATISTICS,
                misc_flags: 0,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn disjoint_queries_answer_without_a_backend_object() {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let query = Query::new(
            &gpu,
            &QueryDesc {
                query: d3d10::QUERY_TIMESTAMP_DISJOINT,
                misc_flags: 0,
            },
        )
        .unwrap();
        assert!(query.gpu_query().is_none());
        assert_eq!(
            query.data(),
            Some(QueryResult::TimestampDisjoint {
                frequency: 1000,
                disjoint: false,
            })
        );
    }

    #[test]
    fn only_bracketed_kinds_are_scoped() {
        let gpu: Arc<dyn GpuDevice> = TraceDevice::new();
        let make = |kind| {
            Query::new(
                &gpu,
                &QueryDesc {
                    query: kind,
                    misc_flags: 0,
                },
            )
            .unwrap()
        };
        assert!(make(d3d10::QUERY_OCCLUSION).is_scoped());
        assert!(!make(d3d10::QUERY_EVENT).is_scoped());
        assert!(!make(d3d10::QUERY_TIMESTAMP).is_scoped());
    }
}
