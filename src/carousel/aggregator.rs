//! Fan-in point for detector votes.

use std::time::Instant;
use tracing::{debug, info};

use super::occupancy::VoteOutcome;
use super::state::{SharedState, VoteRecord};
use crate::types::{DetectionEvent, SourceId};

/// Stamps each vote with the partition under the sensors and folds it into
/// the occupancy ring. Cheap to clone; every detector task holds one.
#[derive(Debug, Clone)]
pub struct DetectionAggregator {
    state: SharedState,
}

impl DetectionAggregator {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub fn report(&self, source: SourceId, positive: bool, now: Instant) -> Option<VoteRecord> {
        let event = DetectionEvent {
            source,
            at: now,
            positive,
        };
        let record = self.state.record_vote(&event)?;
        match record.outcome {
            VoteOutcome::Marked => info!(
                partition = record.index.get(),
                pass = record.pass,
                source = %source,
                "[Aggregator] Metal detected"
            ),
            VoteOutcome::AlreadyMarked => debug!(
                partition = record.index.get(),
                source = %source,
                "[Aggregator] Partition already marked"
            ),
            VoteOutcome::AlreadyConsumed => debug!(
                partition = record.index.get(),
                pass = record.pass,
                source = %source,
                "[Aggregator] Partition already ejected this pass, vote dropped"
            ),
        }
        Some(record)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportConfig, TrackerConfig};
    use crate::types::PartitionIndex;

    fn aggregator() -> DetectionAggregator {
        DetectionAggregator::new(SharedState::new(
            &TrackerConfig::default(),
            &ExportConfig::default(),
        ))
    }

    #[test]
    fn sources_vote_into_the_same_slot() {
        let agg = aggregator();
        let now = Instant::now();
        let first = agg.report(SourceId::Thermal, true, now).unwrap();
        let second = agg.report(SourceId::Proximity { pin: 14 }, true, now).unwrap();
        assert_eq!(first.outcome, VoteOutcome::Marked);
        assert_eq!(second.outcome, VoteOutcome::AlreadyMarked);
        assert!(agg.state().is_occupied(PartitionIndex::ZERO));
        assert_eq!(agg.state().counters().votes_accepted, 1);
    }

    #[test]
    fn negative_report_is_a_no_op() {
        let agg = aggregator();
        assert!(agg.report(SourceId::Pyrometer, false, Instant::now()).is_none());
        assert!(agg.state().export_pending().is_none());
    }
}
