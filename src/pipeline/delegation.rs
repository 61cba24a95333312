//! Modifiers that hand the type-specific part of their work to delegates.
//!
//! A delegate declares which data object kinds it can work on. A
//! [`DelegatingModifier`] owns at most one delegate, chosen either explicitly or
//! by name from the configured defaults. A [`MultiDelegatingModifier`] owns one
//! delegate per registered subclass of its delegate base type and applies every
//! one whose input is present.

use super::error::{PipelineError, PipelineResult};
use super::flow_state::PipelineFlowState;
use super::modifier::{Modifier, ModifierContext, ModifierOutcome};
use super::status::PipelineStatus;
use crate::context::EngineContext;
use crate::data::DataCollection;
use crate::id::ClassId;
use crate::registry::TypeRegistry;
use std::any::Any;

/// Type-specific handler of a delegating modifier.
pub trait ModifierDelegate: Send {
    /// Registered class of this delegate.
    fn class(&self) -> ClassId;

    /// Encoded (`plugin::Name`) data object types this delegate operates on.
    fn applicable_types(&self) -> &[&'static str];

    /// Apply to `state`. `params` are the owning modifier's parameters.
    fn apply(
        &mut self,
        ctx: &ModifierContext<'_>,
        params: &dyn Any,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<PipelineStatus>;
}

/// True if `data` contains an object of any of the delegate's applicable types.
///
/// Type names that do not resolve in `registry` never match.
pub fn is_applicable(
    delegate: &dyn ModifierDelegate,
    registry: &TypeRegistry,
    data: &DataCollection,
) -> bool {
    delegate
        .applicable_types()
        .iter()
        .filter_map(|encoded| registry.decode_type(encoded).ok())
        .any(|class| data.contains_object_recursive(registry, class))
}

/// What happens when the input holds nothing a delegate can work on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InapplicablePolicy {
    /// Fail the evaluation with `InapplicableInput`.
    #[default]
    Fail,
    /// Pass the input through with a warning.
    Warn,
}

/// A delegate plus its enable flag.
pub struct DelegateSlot {
    delegate: Box<dyn ModifierDelegate>,
    enabled: bool,
}

impl DelegateSlot {
    pub fn new(delegate: Box<dyn ModifierDelegate>) -> Self {
        Self {
            delegate,
            enabled: true,
        }
    }

    pub fn delegate(&self) -> &dyn ModifierDelegate {
        self.delegate.as_ref()
    }

    pub fn delegate_mut(&mut self) -> &mut dyn ModifierDelegate {
        self.delegate.as_mut()
    }

    pub fn class(&self) -> ClassId {
        self.delegate.class()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

fn instantiate_delegate(
    engine: &EngineContext,
    class: ClassId,
) -> PipelineResult<Box<dyn ModifierDelegate>> {
    let registry = engine.registry();
    let object = registry.create_instance(class, Some(engine))?;
    let kind = object.kind();
    object.into_delegate().ok_or_else(|| {
        PipelineError::Compute(format!(
            "'{}' produced a {} instead of a modifier delegate",
            registry.class_name(class),
            kind
        ))
    })
}

fn inapplicable(
    title: &str,
    expected: &[&'static str],
    policy: InapplicablePolicy,
) -> PipelineResult<PipelineStatus> {
    match policy {
        InapplicablePolicy::Fail => Err(PipelineError::InapplicableInput {
            stage: title.to_string(),
            expected: expected.join(", "),
        }),
        InapplicablePolicy::Warn => Ok(PipelineStatus::warning(format!(
            "The input contains no data this modifier can operate on ({}).",
            expected.join(", ")
        ))),
    }
}

// ── Single delegate ─────────────────────────────────────────────────────

/// Modifier with one active delegate and parameters of type `P`.
pub struct DelegatingModifier<P> {
    title: String,
    class: ClassId,
    enabled: bool,
    delegate_base: ClassId,
    delegate: Option<DelegateSlot>,
    policy: InapplicablePolicy,
    params: P,
}

impl<P: Any + Send> DelegatingModifier<P> {
    /// Modifier without a delegate.
    pub fn new(title: impl Into<String>, class: ClassId, delegate_base: ClassId, params: P) -> Self {
        Self {
            title: title.into(),
            class,
            enabled: true,
            delegate_base,
            delegate: None,
            policy: InapplicablePolicy::default(),
            params,
        }
    }

    /// Modifier whose delegate is picked by default selection.
    ///
    /// Concrete subclasses of `delegate_base` are enumerated in registration
    /// order and the first whose class name equals `default_name` is
    /// instantiated. With no match, the modifier starts without a delegate.
    pub fn with_default_delegate(
        engine: &EngineContext,
        title: impl Into<String>,
        class: ClassId,
        delegate_base: ClassId,
        default_name: Option<&str>,
        params: P,
    ) -> PipelineResult<Self> {
        let mut modifier = Self::new(title, class, delegate_base, params);
        let registry = engine.registry();

        let chosen = default_name.and_then(|name| {
            registry
                .list_subclasses(delegate_base, true)
                .into_iter()
                .find(|&id| registry.descriptor(id).is_some_and(|d| d.name() == name))
        });

        match chosen {
            Some(id) => {
                tracing::debug!(
                    "Modifier '{}' uses default delegate '{}'",
                    modifier.title,
                    registry.class_name(id)
                );
                modifier.delegate = Some(DelegateSlot::new(instantiate_delegate(engine, id)?));
            }
            None => tracing::debug!("Modifier '{}' has no default delegate", modifier.title),
        }
        Ok(modifier)
    }

    pub fn with_policy(mut self, policy: InapplicablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn delegate(&self) -> Option<&DelegateSlot> {
        self.delegate.as_ref()
    }

    pub fn delegate_mut(&mut self) -> Option<&mut DelegateSlot> {
        self.delegate.as_mut()
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }
}

impl<P: Any + Send> Modifier for DelegatingModifier<P> {
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

    fn evaluate(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<ModifierOutcome> {
        let Some(slot) = self.delegate.as_mut() else {
            return Ok(ModifierOutcome::Completed(PipelineStatus::warning(
                "No delegate is selected. The input passes through unchanged.",
            )));
        };
        if !slot.enabled {
            return Ok(ModifierOutcome::Completed(PipelineStatus::success()));
        }

        let applicable = state
            .data()
            .map(|data| is_applicable(slot.delegate(), ctx.registry(), data))
            .unwrap_or(false);
        if !applicable {
            let types = slot.delegate.applicable_types();
            return inapplicable(&self.title, types, self.policy).map(ModifierOutcome::Completed);
        }

        let status = slot.delegate.apply(ctx, &self.params, state)?;
        Ok(ModifierOutcome::Completed(status))
    }

    fn assign_delegate(&mut self, delegate: Box<dyn ModifierDelegate>) -> PipelineResult<()> {
        self.delegate = Some(DelegateSlot::new(delegate));
        Ok(())
    }

    fn delegate_base(&self) -> Option<ClassId> {
        Some(self.delegate_base)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Multiple delegates ──────────────────────────────────────────────────

/// Modifier that applies every applicable delegate of its family.
pub struct MultiDelegatingModifier<P> {
    title: String,
    class: ClassId,
    enabled: bool,
    delegate_base: ClassId,
    delegates: Vec<DelegateSlot>,
    policy: InapplicablePolicy,
    params: P,
}

impl<P: Any + Send> MultiDelegatingModifier<P> {
    /// Modifier with one delegate per concrete subclass of `delegate_base`.
    pub fn new(
        engine: &EngineContext,
        title: impl Into<String>,
        class: ClassId,
        delegate_base: ClassId,
        params: P,
    ) -> PipelineResult<Self> {
        let delegates = engine
            .registry()
            .list_subclasses(delegate_base, true)
            .into_iter()
            .map(|id| instantiate_delegate(engine, id).map(DelegateSlot::new))
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            title: title.into(),
            class,
            enabled: true,
            delegate_base,
            delegates,
            policy: InapplicablePolicy::default(),
            params,
        })
    }

    pub fn with_policy(mut self, policy: InapplicablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn delegates(&self) -> &[DelegateSlot] {
        &self.delegates
    }

    /// Delegate slot of the given class.
    pub fn delegate_mut(&mut self, class: ClassId) -> Option<&mut DelegateSlot> {
        self.delegates.iter_mut().find(|d| d.class() == class)
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }
}

impl<P: Any + Send> Modifier for MultiDelegatingModifier<P> {
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

    fn evaluate(
        &mut self,
        ctx: &ModifierContext<'_>,
        state: &mut PipelineFlowState,
    ) -> PipelineResult<ModifierOutcome> {
        let registry = ctx.registry();

        // Applicability is decided against the input as a whole, before any delegate mutates it.
        let applicable: Vec<bool> = match state.data() {
            Some(data) => self
                .delegates
                .iter()
                .map(|slot| slot.enabled && is_applicable(slot.delegate(), registry, data))
                .collect(),
            None => vec![false; self.delegates.len()],
        };

        if !applicable.iter().any(|&a| a) {
            let expected: Vec<&'static str> = self
                .delegates
                .iter()
                .filter(|slot| slot.enabled)
                .flat_map(|slot| slot.delegate.applicable_types().iter().copied())
                .collect();
            return inapplicable(&self.title, &expected, self.policy).map(ModifierOutcome::Completed);
        }

        let mut status = PipelineStatus::success();
        for (slot, _) in self
            .delegates
            .iter_mut()
            .zip(applicable)
            .filter(|(_, applicable)| *applicable)
        {
            let delegate_status = slot.delegate.apply(ctx, &self.params, state)?;
            status.merge(&delegate_status);
        }
        Ok(ModifierOutcome::Completed(status))
    }

    /// Replaces the delegate of the same class, or adds it.
    fn assign_delegate(&mut self, delegate: Box<dyn ModifierDelegate>) -> PipelineResult<()> {
        let class = delegate.class();
        match self.delegates.iter_mut().find(|d| d.class() == class) {
            Some(slot) => slot.delegate = delegate,
            None => self.delegates.push(DelegateSlot::new(delegate)),
        }
        Ok(())
    }

    fn delegate_base(&self) -> Option<ClassId> {
        Some(self.delegate_base)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
