//! visflow demo driver
//!
//! Builds a small pipeline over a generated particle trajectory
//! (frames -> scale -> delete selected -> histogram), previews frame 0
//! synchronously, then evaluates every frame to completion and prints the
//! resulting attributes and histogram.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use visflow::{
    config::EngineConfig,
    context::EngineContext,
    data::{DataCollection, DataObject, DataTable, EmptyPayload, PropertyArray},
    id::NodeId,
    pipeline::{
        modifiers::{HistogramModifier, ScalePropertyModifier},
        sources::FrameSequenceSource,
        Pipeline, PipelineStatus, ProgressSink,
    },
};

const FRAMES: i32 = 5;
const PARTICLES: usize = 2000;

/// Logs progress and status updates.
struct LogSink;

impl ProgressSink for LogSink {
    fn progress(&self, node: NodeId, fraction: f64, text: Option<&str>) {
        match text {
            Some(text) => tracing::debug!("{}: {} ({:.0}%)", node, text, fraction * 100.0),
            None => tracing::trace!("{}: {:.0}%", node, fraction * 100.0),
        }
    }

    fn status(&self, node: NodeId, status: &PipelineStatus) {
        tracing::info!("{} status: {}", node, status);
    }
}

/// Particles on a helix drifting outward with the frame number; every tenth is selected.
fn generate_frame(engine: &EngineContext, frame: i32) -> DataCollection {
    let c = engine.classes();
    let mut positions = Vec::with_capacity(PARTICLES * 3);
    let mut selection = Vec::with_capacity(PARTICLES);
    for i in 0..PARTICLES {
        let t = i as f64 * 0.01;
        let r = 1.0 + frame as f64 * 0.25;
        positions.extend_from_slice(&[r * t.cos(), r * t.sin(), t]);
        selection.push(if i % 10 == 0 { 1.0 } else { 0.0 });
    }

    let mut data = DataCollection::new();
    data.add_object(
        DataObject::new(c.particles, EmptyPayload)
            .with_identifier("particles")
            .with_sub_object(
                DataObject::new(c.property, PropertyArray::vector(positions, 3)).with_identifier("Position"),
            )
            .with_sub_object(
                DataObject::new(c.property, PropertyArray::scalar(selection)).with_identifier("Selection"),
            ),
    );
    data
}

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load_or_default();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting visflow demo");

    let ticks_per_frame = config.ticks_per_frame;
    let engine = Arc::new(EngineContext::new(config).context("Failed to create engine context")?);
    let classes = *engine.classes();

    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    pipeline.set_progress_sink(Arc::new(LogSink));

    let source = pipeline.add_source(Box::new(FrameSequenceSource::new(
        "Helix trajectory",
        FRAMES,
        ticks_per_frame,
        Box::new(|engine, frame| Ok(generate_frame(engine, frame))),
    )));
    let scale = pipeline.create_modifier(source, classes.scale_property_modifier)?;
    pipeline.update_modifier::<ScalePropertyModifier, _>(scale, |m| m.params_mut().factor = 2.0)?;
    let delete = pipeline.create_modifier(scale, classes.delete_selected_modifier)?;
    let histogram = pipeline.create_modifier(delete, classes.histogram_modifier)?;
    pipeline.update_modifier::<HistogramModifier, _>(histogram, |m| {
        m.component = 2;
        m.bins = 10;
    })?;

    let preview = pipeline.evaluate_synchronous(histogram, 0)?;
    tracing::info!("Preview of frame 0: {}", preview.status());

    for frame in 0..FRAMES {
        let time = pipeline.source_frame_to_animation_time(histogram, frame)?;
        let state = pipeline
            .evaluate(histogram, time)
            .with_context(|| format!("Failed to evaluate frame {}", frame))?;
        let Some(data) = state.data() else {
            continue;
        };

        println!("Frame {} ({}):", frame, state.status());
        for (key, value) in data.build_attributes_map() {
            println!("  {} = {}", key, value);
        }
        if let Some(table) = data
            .get_object(engine.registry(), classes.data_table, "histogram")
            .and_then(|obj| obj.payload::<DataTable>())
        {
            for (x, y) in table.x.iter().zip(&table.y) {
                println!("  {:>8.3} | {}", x, y);
            }
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}
