//! Histogram modifier: bins one component of a property into a data table.
//!
//! Binning runs on a worker thread. `evaluate` only copies the input values
//! into a [`HistogramEngine`]; the resulting table and the `Histogram.Total`
//! attribute are added when the engine's results are emitted.

use super::container_indices;
use crate::concurrent::{ComputeEngine, TaskContext};
use crate::data::{DataTable, PropertyArray};
use crate::id::ClassId;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::modifier::{Modifier, ModifierContext, ModifierOutcome};
use crate::pipeline::status::PipelineStatus;
use crate::registry::{InstanceContext, RuntimeObject};
use std::any::Any;

/// Attribute holding the number of binned values.
pub const HISTOGRAM_TOTAL_ATTRIBUTE: &str = "Histogram.Total";

/// Elements processed between cancellation checks.
const CANCEL_CHECK_STRIDE: usize = 1024;

pub struct HistogramModifier {
    title: String,
    class: ClassId,
    enabled: bool,
    /// Container class searched for the property.
    pub container: ClassId,
    pub property: String,
    pub component: usize,
    pub bins: usize,
    /// Binning range; computed from the data when `None`.
    pub fixed_range: Option<(f64, f64)>,
    /// Only bin elements whose `Selection` is non-zero.
    pub only_selected: bool,
}

impl HistogramModifier {
    pub fn new(class: ClassId, container: ClassId, property: impl Into<String>) -> Self {
        Self {
            title: "Histogram".to_string(),
            class,
            enabled: true,
            container,
            property: property.into(),
            component: 0,
            bins: 20,
            fixed_range: None,
            only_selected: false,
        }
    }
}

impl Modifier for HistogramModifier {
    fn title(&self) -> &str {
        &self.title
    }

    fn class(&self) -> ClassId {
        self.class
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_asynchronous(&self) -> bool {
        true
    }

    fn evaluate(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<ModifierOutcome> {
        let registry = ctx.registry();
        let missing = || PipelineError::MissingData {
            class: registry.class_name(self.container).to_string(),
            path: self.property.clone(),
        };
        let data = state.data().ok_or_else(missing)?;

        let container = container_indices(data, registry, self.container)
            .into_iter()
            .filter_map(|i| data.objects().get(i))
            .find(|c| c.sub_object(&self.property).is_some())
            .ok_or_else(missing)?;
        let property = container
            .sub_object(&self.property)
            .and_then(|p| p.payload::<PropertyArray>())
            .ok_or_else(missing)?;
        if self.component >= property.components() {
            return Err(PipelineError::Compute(format!(
                "Property '{}' has no component {}",
                self.property, self.component
            )));
        }

        let mut values: Vec<f64> = property.component_iter(self.component).collect();
        if self.only_selected {
            if let Some(selection) = container
                .sub_object("Selection")
                .and_then(|s| s.payload::<PropertyArray>())
            {
                values = values
                    .into_iter()
                    .zip(selection.component_iter(0))
                    .filter(|(_, s)| *s != 0.0)
                    .map(|(v, _)| v)
                    .collect();
            }
        }

        Ok(ModifierOutcome::Engine(Box::new(HistogramEngine::new(
            self.property.clone(),
            values,
            self.bins,
            self.fixed_range,
        ))))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Background part of [`HistogramModifier`].
pub struct HistogramEngine {
    property: String,
    values: Vec<f64>,
    bins: usize,
    fixed_range: Option<(f64, f64)>,
    range: (f64, f64),
    counts: Vec<u64>,
    binned: u64,
}

impl HistogramEngine {
    pub fn new(property: String, values: Vec<f64>, bins: usize, fixed_range: Option<(f64, f64)>) -> Self {
        Self {
            property,
            values,
            bins: bins.max(1),
            fixed_range,
            range: (0.0, 0.0),
            counts: Vec::new(),
            binned: 0,
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    fn compute_range(&self) -> (f64, f64) {
        if let Some(range) = self.fixed_range {
            return range;
        }
        let finite = self.values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }
}

impl ComputeEngine for HistogramEngine {
    fn perform(&mut self, task: &TaskContext) -> PipelineResult<()> {
        task.set_progress_text(format!("Computing histogram of '{}'", self.property));
        self.range = self.compute_range();
        let (min, max) = self.range;
        let width = max - min;
        let mut counts = vec![0u64; self.bins];
        let mut binned = 0u64;

        let total = self.values.len().max(1) as f64;
        for (i, &v) in self.values.iter().enumerate() {
            if i % CANCEL_CHECK_STRIDE == 0 {
                task.check_canceled()?;
                task.set_progress(i as f64 / total);
            }
            if !v.is_finite() || v < min || v > max {
                continue;
            }
            let bin = if width > 0.0 {
                (((v - min) / width) * self.bins as f64) as usize
            } else {
                0
            };
            counts[bin.min(self.bins - 1)] += 1;
            binned += 1;
        }

        task.check_canceled()?;
        task.set_progress(1.0);
        self.counts = counts;
        self.binned = binned;
        Ok(())
    }

    fn emit_results(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<PipelineStatus> {
        let registry = ctx.registry();
        let classes = ctx.classes();
        let (min, max) = self.range;
        let step = (max - min) / self.bins as f64;

        let table = DataTable {
            title: format!("Histogram of {}", self.property),
            x_label: self.property.clone(),
            y_label: "Count".to_string(),
            x: (0..self.bins).map(|i| min + step * (i as f64 + 0.5)).collect(),
            y: self.counts.iter().map(|&c| c as f64).collect(),
        };

        let data = state.mutable_data();
        data.create_object(registry, classes.data_table, Some(ctx.node), "histogram", table);
        data.add_attribute(
            registry,
            classes.attribute,
            HISTOGRAM_TOTAL_ATTRIBUTE,
            self.binned as i64,
            Some(ctx.node),
        );

        if self.binned == 0 {
            return Ok(PipelineStatus::warning(format!(
                "No values of '{}' fall into the histogram range",
                self.property
            )));
        }
        Ok(PipelineStatus::success_with(format!(
            "Binned {} values into {} bins",
            self.binned, self.bins
        )))
    }
}

// ── Registry constructor ──

pub(crate) fn create_modifier(ctx: &InstanceContext<'_>) -> Result<RuntimeObject, String> {
    let engine = ctx.require_engine()?;
    Ok(RuntimeObject::Modifier(Box::new(HistogramModifier::new(
        ctx.class,
        engine.classes().particles,
        "Position",
    ))))
}
