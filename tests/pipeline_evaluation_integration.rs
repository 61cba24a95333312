//! Integration tests for synchronous and complete pipeline evaluation

mod common;

use common::builders::{property_values, ParticlesBuilder};
use common::mock_helpers::{CountingModifier, CountingSource};
use common::{engine, engine_with, wait_for};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use visflow::{
    context::EngineContext,
    data::DataCollection,
    id::NodeId,
    pipeline::{
        modifiers::{scale::SCALE_MODIFIER_NAME, DeleteSelectedModifier, ScalePropertyModifier},
        sources::{FrameSequenceSource, StaticSource},
        EvaluationRequest, Pipeline, PipelineError, PipelineStatus, StatusType, TimeInterval,
        DISABLED_STATUS_TEXT,
    },
};

fn particles(engine: &EngineContext) -> DataCollection {
    ParticlesBuilder::new()
        .position(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]])
        .selection(&[0, 1, 0])
        .scalar("Mass", &[1.0, 2.0, 3.0])
        .collection(engine)
}

fn evaluations(data: &DataCollection, key: &str) -> Option<i64> {
    data.get_attribute_value(key).and_then(|v| v.as_int())
}

// ── Synchronous evaluation and caching ──

#[test]
fn test_synchronous_result_is_reused() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = CountingSource::new(particles(&engine));
    let source_count = Arc::clone(&source.evaluations);
    let src = pipeline.add_source(Box::new(source));

    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    let state = pipeline.evaluate_synchronous(m, 0).unwrap();
    assert_eq!(evaluations(state.data().unwrap(), "Evaluations"), Some(1));

    let again = pipeline.evaluate_synchronous(m, 100).unwrap();
    assert_eq!(evaluations(again.data().unwrap(), "Evaluations"), Some(1));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(source_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalidate_keeps_requested_interval() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = CountingSource::new(particles(&engine));
    let source_count = Arc::clone(&source.evaluations);
    let src = pipeline.add_source(Box::new(source));
    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    pipeline.evaluate_synchronous(m, 0).unwrap();
    pipeline.invalidate(m, TimeInterval::new(5, 10), false).unwrap();

    pipeline.evaluate_synchronous(m, 7).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1, "time 7 lies inside the kept interval");

    pipeline.evaluate_synchronous(m, 12).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2, "time 12 was invalidated");

    // Only the modifier was invalidated; the source result is still valid
    assert_eq!(source_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_complete_result_is_cached_over_validity() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let mut modifier = CountingModifier::new("Count");
    modifier.validity = Some(TimeInterval::new(0, 99));
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    let state = pipeline.evaluate(m, 10).unwrap();
    assert_eq!(state.validity(), TimeInterval::new(0, 99));
    assert!(pipeline.cached_state(m, 50).is_some());
    assert!(pipeline.cached_state(m, 100).is_none());

    let future = pipeline.evaluate_pipeline(pipeline.request(50), m).unwrap();
    assert!(future.is_finished());
    assert_eq!(count.load(Ordering::SeqCst), 1);

    pipeline.evaluate(m, 100).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

// ── Status handling ──

#[test]
fn test_missing_delegate_passes_input_with_warning() {
    let engine = engine_with(|config| {
        config
            .default_delegates
            .insert(SCALE_MODIFIER_NAME.to_string(), "NoSuchDelegate".to_string());
    });
    let classes = *engine.classes();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(StaticSource::new("Input", particles(&engine))));
    let scale = pipeline.create_modifier(src, classes.scale_property_modifier).unwrap();
    pipeline
        .update_modifier::<ScalePropertyModifier, _>(scale, |m| {
            assert!(m.delegate().is_none());
            m.params_mut().factor = 3.0;
        })
        .unwrap();

    let state = pipeline.evaluate_synchronous(scale, 0).unwrap();
    assert_eq!(state.status().status_type(), StatusType::Warning);
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Position"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
    assert_eq!(
        pipeline.stage_status(scale).unwrap().status_type(),
        StatusType::Warning
    );
}

#[test]
fn test_disabled_modifier_passes_through() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    pipeline.set_modifier_enabled(m, false).unwrap();
    let state = pipeline.evaluate_synchronous(m, 0).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(state.data().unwrap().get_attribute_value("Evaluations").is_none());
    let status = pipeline.stage_status(m).unwrap();
    assert_eq!(status.status_type(), StatusType::Success);
    assert_eq!(status.text(), DISABLED_STATUS_TEXT);
}

#[test]
fn test_break_on_error_skips_modifiers() {
    let engine = engine_with(|config| config.break_on_error = true);
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = CountingSource::new(particles(&engine)).with_status(PipelineStatus::error("bad input"));
    let src = pipeline.add_source(Box::new(source));
    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    let state = pipeline.evaluate_synchronous(m, 0).unwrap();
    assert!(state.status().is_error());
    assert_eq!(state.status().text(), "bad input");
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_error_input_still_modified_without_break_on_error() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = CountingSource::new(particles(&engine)).with_status(PipelineStatus::error("bad input"));
    let src = pipeline.add_source(Box::new(source));
    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    let future = pipeline
        .evaluate_pipeline(EvaluationRequest::at(0).with_break_on_error(false), m)
        .unwrap();
    let state = wait_for(&mut pipeline, &future).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(state.status().is_error(), "the upstream error survives the modifier");
    assert_eq!(evaluations(state.data().unwrap(), "Evaluations"), Some(1));
}

#[test]
fn test_modifier_failure() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let mut modifier = CountingModifier::new("Count");
    modifier.fail = true;
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    // Synchronous path: unmodified input with an error status
    let preview = pipeline.evaluate_synchronous(m, 0).unwrap();
    assert!(preview.status().is_error());
    assert!(preview.status().text().contains("Modifier 'Count' reported"));
    assert!(preview.data().unwrap().get_attribute_value("Evaluations").is_none());

    // Complete path: the error itself, nothing cached
    let err = pipeline.evaluate(m, 0).unwrap_err();
    assert!(err.to_string().starts_with("Modifier 'Count' reported"));
    assert!(matches!(err.root_cause(), PipelineError::Compute(_)));
    assert!(pipeline.cached_state(m, 0).is_none());
    assert!(pipeline.stage_status(m).unwrap().is_error());
}

#[test]
fn test_upstream_failure_gains_downstream_context() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let mut failing = CountingModifier::new("Count");
    failing.fail = true;
    let a = pipeline.add_modifier(src, Box::new(failing)).unwrap();
    let downstream = CountingModifier::new("Tally");
    let tally = downstream.counter();
    let b = pipeline.add_modifier(a, Box::new(downstream)).unwrap();

    let err = pipeline.evaluate(b, 0).unwrap_err();
    let message = err.to_string();
    assert!(
        message.starts_with("Input of modifier 'Tally' failed: Modifier 'Count' reported"),
        "{}",
        message
    );
    assert!(matches!(err.root_cause(), PipelineError::Compute(_)));
    assert_eq!(tally.load(Ordering::SeqCst), 0);
    assert!(pipeline.cached_state(b, 0).is_none());
}

// ── Change propagation ──

#[test]
fn test_target_changed_propagates_downstream() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let first = CountingModifier::new("First");
    let second = CountingModifier::new("Second");
    let (first_count, second_count) = (first.counter(), second.counter());
    let a = pipeline.add_modifier(src, Box::new(first)).unwrap();
    let b = pipeline.add_modifier(a, Box::new(second)).unwrap();

    pipeline.evaluate(b, 0).unwrap();
    pipeline.notify_target_changed(src, TimeInterval::infinite()).unwrap();
    assert!(pipeline.cached_state(a, 0).is_none());
    assert!(pipeline.cached_state(b, 0).is_none());

    let state = pipeline.evaluate(b, 0).unwrap();
    assert_eq!(first_count.load(Ordering::SeqCst), 2);
    assert_eq!(second_count.load(Ordering::SeqCst), 2);
    let data = state.data().unwrap();
    assert_eq!(evaluations(data, "Evaluations"), Some(2));
    assert_eq!(evaluations(data, "Evaluations.2"), Some(2));
}

#[test]
fn test_target_changed_pruned_outside_validity() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let mut first = CountingModifier::new("First");
    first.validity = Some(TimeInterval::new(0, 9));
    let first_count = first.counter();
    let a = pipeline.add_modifier(src, Box::new(first)).unwrap();
    let b = pipeline.add_modifier(a, Box::new(CountingModifier::new("Second"))).unwrap();

    pipeline.evaluate(b, 0).unwrap();
    pipeline.notify_target_changed(src, TimeInterval::new(100, 200)).unwrap();

    // The source loses the changed span; downstream results never covered it
    assert!(pipeline.cached_state(src, 150).is_none());
    assert!(pipeline.cached_state(src, 0).is_some());
    assert!(pipeline.cached_state(a, 5).is_some());
    assert!(pipeline.cached_state(b, 5).is_some());

    pipeline.evaluate(b, 0).unwrap();
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_source_notifier_from_other_thread() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = CountingSource::new(particles(&engine));
    let source_count = Arc::clone(&source.evaluations);
    let src = pipeline.add_source(Box::new(source));
    let m = pipeline.add_modifier(src, Box::new(CountingModifier::new("Count"))).unwrap();

    let notifier = pipeline
        .update_source::<CountingSource, _>(src, |s| s.notifier.clone())
        .unwrap()
        .expect("source is connected");
    assert_eq!(notifier.node(), src);

    pipeline.evaluate(m, 0).unwrap();
    assert_eq!(source_count.load(Ordering::SeqCst), 1);

    std::thread::spawn(move || assert!(notifier.target_changed(TimeInterval::infinite())))
        .join()
        .unwrap();

    // Applied on the owner thread only
    assert!(pipeline.cached_state(m, 0).is_some());
    pipeline.process_events();
    assert!(pipeline.cached_state(m, 0).is_none());

    pipeline.evaluate(m, 0).unwrap();
    assert_eq!(source_count.load(Ordering::SeqCst), 2);
}

#[test]
fn test_updating_source_data_reaches_output() {
    let engine = engine();
    let classes = *engine.classes();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(StaticSource::new("Input", particles(&engine))));
    let scale = pipeline.create_modifier(src, classes.scale_property_modifier).unwrap();
    pipeline
        .update_modifier::<ScalePropertyModifier, _>(scale, |m| m.params_mut().factor = 10.0)
        .unwrap();

    pipeline.evaluate(scale, 0).unwrap();
    let replacement = ParticlesBuilder::new().position(&[[0.5, 0.5, 0.5]]).collection(&engine);
    pipeline
        .update_source::<StaticSource, _>(src, |s| s.set_data(replacement))
        .unwrap();

    let state = pipeline.evaluate(scale, 0).unwrap();
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Position"),
        vec![5.0, 5.0, 5.0]
    );
}

// ── Graph editing ──

#[test]
fn test_remove_stage_rewires_dependents() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let first = CountingModifier::new("First");
    let first_count = first.counter();
    let a = pipeline.add_modifier(src, Box::new(first)).unwrap();
    let b = pipeline.add_modifier(a, Box::new(CountingModifier::new("Second"))).unwrap();

    pipeline.evaluate(b, 0).unwrap();
    pipeline.remove_stage(a).unwrap();

    assert_eq!(pipeline.stage(b).unwrap().input(), Some(src));
    assert!(matches!(pipeline.stage(a), Err(PipelineError::InvalidNode(n)) if n == a));
    assert_eq!(pipeline.stages().count(), 2);
    assert!(pipeline.cached_state(b, 0).is_none());

    let state = pipeline.evaluate(b, 0).unwrap();
    assert_eq!(first_count.load(Ordering::SeqCst), 1);
    assert_eq!(evaluations(state.data().unwrap(), "Evaluations"), Some(2));
    assert!(state.data().unwrap().get_attribute_value("Evaluations.2").is_none());
}

#[test]
fn test_set_input_rejects_cycles() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(CountingSource::new(particles(&engine))));
    let a = pipeline.add_modifier(src, Box::new(CountingModifier::new("A"))).unwrap();
    let b = pipeline.add_modifier(a, Box::new(CountingModifier::new("B"))).unwrap();

    assert_eq!(pipeline.set_input(a, Some(b)), Err(PipelineError::CycleDetected));
    assert_eq!(pipeline.set_input(a, Some(a)), Err(PipelineError::CycleDetected));
    assert_eq!(pipeline.set_input(src, Some(a)), Err(PipelineError::InvalidNode(src)));
    assert!(matches!(
        pipeline.add_modifier(NodeId(99), Box::new(CountingModifier::new("Lost"))),
        Err(PipelineError::InvalidNode(_))
    ));

    pipeline.set_input(b, Some(src)).unwrap();
    assert_eq!(pipeline.pipeline_source(b), Some(src));

    pipeline.set_input(b, None).unwrap();
    assert_eq!(pipeline.pipeline_source(b), None);
    let detached = pipeline.evaluate_synchronous(b, 0).unwrap();
    assert!(detached.is_empty());
}

// ── Frame mapping ──

#[test]
fn test_frame_sequence_mapping_and_validity() {
    let engine = engine();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let source = FrameSequenceSource::new(
        "Frames",
        5,
        100,
        Box::new(|engine: &EngineContext, frame: i32| {
            Ok(ParticlesBuilder::new()
                .position(&[[frame as f64, 0.0, 0.0]])
                .collection(engine))
        }),
    );
    let src = pipeline.add_source(Box::new(source));
    let modifier = CountingModifier::new("Count");
    let count = modifier.counter();
    let m = pipeline.add_modifier(src, Box::new(modifier)).unwrap();

    assert_eq!(pipeline.number_of_source_frames(m).unwrap(), 5);
    assert_eq!(pipeline.animation_time_to_source_frame(m, 250).unwrap(), 2);
    assert_eq!(pipeline.animation_time_to_source_frame(m, 10_000).unwrap(), 4);
    assert_eq!(pipeline.source_frame_to_animation_time(m, 3).unwrap(), 300);

    let state = pipeline.evaluate(m, 250).unwrap();
    assert_eq!(state.validity(), TimeInterval::new(200, 299));
    assert_eq!(state.data().unwrap().source_frame(), Some(2));
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Position"),
        vec![2.0, 0.0, 0.0]
    );

    pipeline.evaluate(m, 260).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let next = pipeline.evaluate(m, 300).unwrap();
    assert_eq!(next.data().unwrap().source_frame(), Some(3));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

// ── Built-in modifiers ──

#[test]
fn test_scale_modifier_leaves_input_untouched() {
    let engine = engine();
    let classes = *engine.classes();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(StaticSource::new("Input", particles(&engine))));
    let scale = pipeline.create_modifier(src, classes.scale_property_modifier).unwrap();
    pipeline
        .update_modifier::<ScalePropertyModifier, _>(scale, |m| {
            assert_eq!(m.delegate().map(|d| d.class()), Some(classes.particles_scale_delegate));
            m.params_mut().factor = 2.0;
        })
        .unwrap();

    let state = pipeline.evaluate(scale, 0).unwrap();
    assert_eq!(state.status().status_type(), StatusType::Success);
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Position"),
        vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0]
    );

    let input = pipeline.cached_state(src, 0).unwrap();
    assert_eq!(
        property_values(&engine, input.data().unwrap(), "particles/Position"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
    // Untouched properties stay shared with the input
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Mass"),
        vec![1.0, 2.0, 3.0]
    );
}

#[test]
fn test_delete_selected_then_scale() {
    let engine = engine();
    let classes = *engine.classes();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(StaticSource::new("Input", particles(&engine))));
    let delete = pipeline.create_modifier(src, classes.delete_selected_modifier).unwrap();
    let scale = pipeline.create_modifier(delete, classes.scale_property_modifier).unwrap();
    pipeline
        .update_modifier::<ScalePropertyModifier, _>(scale, |m| m.params_mut().property = "Mass".to_string())
        .unwrap();
    pipeline
        .update_modifier::<ScalePropertyModifier, _>(scale, |m| m.params_mut().factor = -1.0)
        .unwrap();

    let state = pipeline.evaluate(scale, 0).unwrap();
    let data = state.data().unwrap();
    assert_eq!(property_values(&engine, data, "particles/Mass"), vec![-1.0, -3.0]);
    assert_eq!(
        property_values(&engine, data, "particles/Position"),
        vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0]
    );
    assert!(data
        .get_object(engine.registry(), classes.property, "particles/Selection")
        .is_none());

    let delete_status = pipeline.stage_status(delete).unwrap();
    assert!(delete_status.text().contains("Deleted 1 of 3 Particles elements"));

    let delegates = pipeline
        .update_modifier::<DeleteSelectedModifier, _>(delete, |m| m.delegates().len())
        .unwrap();
    assert_eq!(delegates, 2, "one delegate per container kind");
}

#[test]
fn test_assign_delegate_checks_type() {
    let engine = engine();
    let classes = *engine.classes();
    let mut pipeline = Pipeline::new(Arc::clone(&engine));
    let src = pipeline.add_source(Box::new(StaticSource::new("Input", particles(&engine))));
    let scale = pipeline.create_modifier(src, classes.scale_property_modifier).unwrap();
    let counting = pipeline.add_modifier(scale, Box::new(CountingModifier::new("Count"))).unwrap();

    assert!(matches!(
        pipeline.assign_delegate(scale, classes.particles_delete_selected_delegate),
        Err(PipelineError::IncompatibleDelegate { .. })
    ));
    assert!(matches!(
        pipeline.assign_delegate(counting, classes.particles_scale_delegate),
        Err(PipelineError::NotDelegating(title)) if title == "Count"
    ));

    // A bonds delegate cannot work on a particles-only input
    pipeline.assign_delegate(scale, classes.bonds_scale_delegate).unwrap();
    let state = pipeline.evaluate_synchronous(scale, 0).unwrap();
    assert!(state.status().is_error());
    assert_eq!(
        property_values(&engine, state.data().unwrap(), "particles/Position"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
    let err = pipeline.evaluate(scale, 0).unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::InapplicableInput { .. }));
}
