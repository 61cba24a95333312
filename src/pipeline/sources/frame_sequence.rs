//! Source that replays a sequence of frames, one collection per animation frame.

use crate::concurrent::SharedFuture;
use crate::context::EngineContext;
use crate::data::{DataCollection, SOURCE_FRAME_ATTRIBUTE};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::flow_state::{EvaluationRequest, PipelineFlowState};
use crate::pipeline::source::{DataSource, SourceContext};
use crate::pipeline::status::PipelineStatus;
use crate::pipeline::time::{TimeInterval, TimePoint};

/// Produces the collection for one frame.
pub type FrameGenerator =
    Box<dyn FnMut(&EngineContext, i32) -> PipelineResult<DataCollection> + Send>;

/// Source of a fixed number of frames, one per `ticks_per_frame` of animation time.
///
/// Each frame's output is valid for exactly the span of animation time that
/// maps to that frame and carries a `SourceFrame` attribute.
pub struct FrameSequenceSource {
    title: String,
    frame_count: i32,
    ticks_per_frame: TimePoint,
    generator: FrameGenerator,
}

impl FrameSequenceSource {
    pub fn new(
        title: impl Into<String>,
        frame_count: i32,
        ticks_per_frame: TimePoint,
        generator: FrameGenerator,
    ) -> Self {
        Self {
            title: title.into(),
            frame_count: frame_count.max(1),
            ticks_per_frame: ticks_per_frame.max(1),
            generator,
        }
    }

    /// Animation time span that displays `frame`.
    ///
    /// The first and last frames extend to negative and positive infinity.
    pub fn frame_interval(&self, frame: i32) -> TimeInterval {
        let start = if frame <= 0 {
            TimePoint::MIN
        } else {
            frame.saturating_mul(self.ticks_per_frame)
        };
        let end = if frame >= self.frame_count - 1 {
            TimePoint::MAX
        } else {
            frame
                .saturating_add(1)
                .saturating_mul(self.ticks_per_frame)
                .saturating_sub(1)
        };
        TimeInterval::new(start, end)
    }

    fn load_frame(&mut self, ctx: &SourceContext<'_>, time: TimePoint) -> PipelineFlowState {
        let engine = ctx.engine;
        let frame = self.animation_time_to_source_frame(time);
        let validity = self.frame_interval(frame);

        match (self.generator)(engine, frame) {
            Ok(mut data) => {
                let classes = engine.classes();
                data.add_attribute(
                    engine.registry(),
                    classes.attribute,
                    SOURCE_FRAME_ATTRIBUTE,
                    frame as i64,
                    Some(ctx.node),
                );
                PipelineFlowState::new(data, PipelineStatus::success(), validity)
            }
            Err(e) => {
                tracing::warn!("Source '{}' failed to load frame {}: {}", self.title, frame, e);
                let mut state = PipelineFlowState::empty();
                state.set_status(PipelineStatus::error(format!(
                    "Failed to load frame {}: {}",
                    frame, e
                )));
                state.set_validity(validity);
                state
            }
        }
    }
}

impl DataSource for FrameSequenceSource {
    fn title(&self) -> &str {
        &self.title
    }

    fn evaluate(
        &mut self,
        ctx: &SourceContext<'_>,
        request: &EvaluationRequest,
    ) -> SharedFuture<PipelineFlowState> {
        SharedFuture::ready(Ok(self.load_frame(ctx, request.time)))
    }

    fn evaluate_preliminary(&mut self, ctx: &SourceContext<'_>, time: TimePoint) -> PipelineFlowState {
        self.load_frame(ctx, time)
    }

    fn number_of_frames(&self) -> i32 {
        self.frame_count
    }

    fn animation_time_to_source_frame(&self, time: TimePoint) -> i32 {
        time.div_euclid(self.ticks_per_frame)
            .clamp(0, self.frame_count - 1)
    }

    fn source_frame_to_animation_time(&self, frame: i32) -> TimePoint {
        frame
            .clamp(0, self.frame_count - 1)
            .saturating_mul(self.ticks_per_frame)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
