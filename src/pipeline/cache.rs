//! Per-node memoization of pipeline output.

use super::flow_state::PipelineFlowState;
use super::time::{TimeInterval, TimePoint};
use crate::concurrent::SharedFuture;

/// Cached output of one pipeline node.
///
/// Holds the last complete result, the last preliminary (synchronous) result,
/// and the single in-flight asynchronous evaluation. Each stored state is only
/// served for times inside its validity interval.
///
/// Every invalidation bumps a generation counter. Evaluations started under an
/// older generation still resolve their futures but are not stored.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    cached: Option<PipelineFlowState>,
    preliminary: Option<PipelineFlowState>,
    in_flight: Option<(TimePoint, SharedFuture<PipelineFlowState>)>,
    generation: u64,
    served: TimeInterval,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete result valid at `time`.
    pub fn get_at(&self, time: TimePoint) -> Option<&PipelineFlowState> {
        self.cached
            .as_ref()
            .filter(|state| state.validity().contains(time))
    }

    /// Preliminary result valid at `time`.
    pub fn preliminary_at(&self, time: TimePoint) -> Option<&PipelineFlowState> {
        self.preliminary
            .as_ref()
            .filter(|state| state.validity().contains(time))
    }

    /// Last complete result regardless of time.
    pub fn cached_state(&self) -> Option<&PipelineFlowState> {
        self.cached.as_ref()
    }

    /// Last preliminary result regardless of time.
    pub fn preliminary_state(&self) -> Option<&PipelineFlowState> {
        self.preliminary.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Union of the validity intervals of everything currently stored.
    pub fn served_interval(&self) -> TimeInterval {
        self.served
    }

    /// Store a complete result computed under `generation`.
    ///
    /// Returns false, storing nothing, if the cache was invalidated since.
    pub fn insert(&mut self, state: PipelineFlowState, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.served = self.served.hull(&state.validity());
        self.cached = Some(state);
        true
    }

    pub fn set_preliminary(&mut self, state: PipelineFlowState) {
        self.served = self.served.hull(&state.validity());
        self.preliminary = Some(state);
    }

    /// Unfinished evaluation for `time`, if any.
    pub fn in_flight(&self, time: TimePoint) -> Option<SharedFuture<PipelineFlowState>> {
        self.in_flight
            .as_ref()
            .filter(|(t, future)| *t == time && !future.is_finished())
            .map(|(_, future)| future.clone())
    }

    /// Register the evaluation for `time`. Replaces any evaluation for another time.
    pub fn set_in_flight(&mut self, time: TimePoint, future: SharedFuture<PipelineFlowState>) {
        self.in_flight = Some((time, future));
    }

    /// Forget `future` if it is the registered in-flight evaluation.
    pub fn clear_in_flight(&mut self, future: &SharedFuture<PipelineFlowState>) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|(_, f)| SharedFuture::ptr_eq(f, future))
        {
            self.in_flight = None;
        }
    }

    /// Shrink every stored validity interval to its intersection with `keep`.
    ///
    /// States left with an empty interval are dropped. With `reset_synchronous`
    /// the preliminary state is dropped regardless. The in-flight evaluation is
    /// detached so the next request starts a fresh one.
    pub fn invalidate(&mut self, keep: TimeInterval, reset_synchronous: bool) {
        self.generation += 1;
        self.in_flight = None;

        self.cached = self.cached.take().and_then(|state| restrict(state, &keep));
        self.preliminary = if reset_synchronous {
            None
        } else {
            self.preliminary.take().and_then(|state| restrict(state, &keep))
        };
        self.recompute_served();
    }

    /// Drop the part of every stored validity interval that overlaps `changed`.
    pub fn invalidate_changed(&mut self, changed: &TimeInterval, reset_synchronous: bool) {
        self.generation += 1;
        self.in_flight = None;

        self.cached = self.cached.take().and_then(|state| {
            let keep = state.validity().excluding(changed);
            restrict(state, &keep)
        });
        self.preliminary = if reset_synchronous {
            None
        } else {
            self.preliminary.take().and_then(|state| {
                let keep = state.validity().excluding(changed);
                restrict(state, &keep)
            })
        };
        self.recompute_served();
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.invalidate(TimeInterval::empty(), true);
    }

    fn recompute_served(&mut self) {
        self.served = [self.cached.as_ref(), self.preliminary.as_ref()]
            .into_iter()
            .flatten()
            .fold(TimeInterval::empty(), |acc, s| acc.hull(&s.validity()));
    }
}

fn restrict(mut state: PipelineFlowState, keep: &TimeInterval) -> Option<PipelineFlowState> {
    state.intersect_validity(keep);
    (!state.validity().is_empty()).then_some(state)
}
