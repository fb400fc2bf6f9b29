//! Writes caller parameters into a workflow template.

use serde_json::Value;

use crate::config::{SlotRef, WorkflowSlots};
use crate::template::{TemplateError, WorkflowTemplate};

/// Fills the configured prompt and image slots of a template.
#[derive(Debug, Clone)]
pub struct ParameterInjector {
    slots: WorkflowSlots,
}

impl ParameterInjector {
    pub fn new(slots: WorkflowSlots) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &WorkflowSlots {
        &self.slots
    }

    /// Whether the configured template takes an input image at all.
    pub fn accepts_image(&self) -> bool {
        self.slots.image.is_some()
    }

    /// Verify that every configured slot exists in `template`.
    pub fn check(&self, template: &WorkflowTemplate) -> Result<(), TemplateError> {
        let slots = std::iter::once(&self.slots.positive)
            .chain(std::iter::once(&self.slots.negative))
            .chain(self.slots.image.as_ref());
        for slot in slots {
            check_slot(template, slot)?;
        }
        Ok(())
    }

    /// Return a copy of `template` with the prompts written into their
    /// slots and, when present, `asset_ref` written into the image slot.
    ///
    /// Every configured slot is checked before anything is written, so a
    /// template missing the image slot is rejected even for requests
    /// without an image. An `asset_ref` given while the image slot is
    /// disabled is an error, never silently dropped. The input template is
    /// never modified.
    pub fn inject(
        &self,
        template: &WorkflowTemplate,
        positive_prompt: &str,
        negative_prompt: &str,
        asset_ref: Option<&str>,
    ) -> Result<WorkflowTemplate, TemplateError> {
        self.check(template)?;
        if asset_ref.is_some() && !self.accepts_image() {
            return Err(TemplateError::ImageSlotDisabled);
        }

        let mut workflow = template.clone();
        write_slot(&mut workflow, &self.slots.positive, positive_prompt)?;
        write_slot(&mut workflow, &self.slots.negative, negative_prompt)?;
        if let (Some(slot), Some(asset_ref)) = (&self.slots.image, asset_ref) {
            write_slot(&mut workflow, slot, asset_ref)?;
        }
        Ok(workflow)
    }
}

fn slot_missing(slot: &SlotRef) -> TemplateError {
    TemplateError::SlotMissing {
        node_id: slot.node_id.clone(),
        input: slot.input.clone(),
    }
}

fn check_slot(template: &WorkflowTemplate, slot: &SlotRef) -> Result<(), TemplateError> {
    template
        .node(&slot.node_id)
        .filter(|node| node.inputs.contains_key(&slot.input))
        .map(|_| ())
        .ok_or_else(|| slot_missing(slot))
}

fn write_slot(workflow: &mut WorkflowTemplate, slot: &SlotRef, value: &str) -> Result<(), TemplateError> {
    let input = workflow
        .node_mut(&slot.node_id)
        .and_then(|node| node.inputs.get_mut(&slot.input))
        .ok_or_else(|| slot_missing(slot))?;
    *input = Value::String(value.to_string());
    Ok(())
}
