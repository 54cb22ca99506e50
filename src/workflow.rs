//! Workflow template loading and per-job patching.
//!
//! The template is an opaque ComfyUI API-format graph. Only three leaf inputs
//! are ever written: the prompt text, the input image filename and the noise
//! seed. Everything else passes through untouched.

use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RelayError;

/// File name the decoded input image is staged under in the engine's input folder.
pub const STAGED_INPUT_FILENAME: &str = "input.png";

/// Largest seed handed to the noise node (`2^31 - 1`).
pub const MAX_SEED: u32 = 2_147_483_647;

const BUNDLED_TEMPLATE: &str = include_str!("../workflows/flux_controlnet_upscale.json");

/// Node ids and input fields the relay writes to, plus the node whose images are returned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkflowBindings {
    /// Node holding the prompt text.
    pub prompt_node: String,
    /// Input field of `prompt_node` set to the prompt.
    pub prompt_field: String,
    /// Image loader node.
    pub image_node: String,
    /// Input field of `image_node` set to the staged filename.
    pub image_field: String,
    /// Noise node.
    pub seed_node: String,
    /// Input field of `seed_node` set to a random seed.
    pub seed_field: String,
    /// Node whose first output image is returned.
    pub output_node: String,
}

impl Default for WorkflowBindings {
    fn default() -> Self {
        Self {
            prompt_node: "56".to_string(),
            prompt_field: "text".to_string(),
            image_node: "1".to_string(),
            image_field: "image".to_string(),
            seed_node: "39".to_string(),
            seed_field: "noise_seed".to_string(),
            output_node: "95".to_string(),
        }
    }
}

/// An immutable workflow template. Each job patches a deep copy.
#[derive(Debug, Clone)]
pub struct Workflow {
    template: Value,
    bindings: WorkflowBindings,
}

impl Workflow {
    /// The workflow bundled with the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the bindings don't match the bundled template.
    pub fn bundled(bindings: WorkflowBindings) -> Result<Self, RelayError> {
        Self::parse(BUNDLED_TEMPLATE, bindings)
    }

    /// Load a template from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read, isn't a JSON object, or
    /// lacks a bound node or field.
    pub fn from_file(path: &Path, bindings: WorkflowBindings) -> Result<Self, RelayError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Workflow(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&contents, bindings)
    }

    /// Parse a template and check that every binding points at an existing input.
    ///
    /// # Errors
    ///
    /// Returns an error if the text isn't a JSON object or a binding is dangling.
    pub fn parse(json: &str, bindings: WorkflowBindings) -> Result<Self, RelayError> {
        let template: Value = serde_json::from_str(json)
            .map_err(|e| RelayError::Workflow(format!("template is not valid JSON: {e}")))?;
        if !template.is_object() {
            return Err(RelayError::Workflow("template must be a JSON object of nodes".into()));
        }

        for (node, field) in [
            (&bindings.prompt_node, &bindings.prompt_field),
            (&bindings.image_node, &bindings.image_field),
            (&bindings.seed_node, &bindings.seed_field),
        ] {
            let inputs = template
                .get(node)
                .and_then(|n| n.get("inputs"))
                .and_then(Value::as_object)
                .ok_or_else(|| RelayError::Workflow(format!("node {node} has no inputs")))?;
            if !inputs.contains_key(field) {
                return Err(RelayError::Workflow(format!("node {node} has no input '{field}'")));
            }
        }
        if template.get(&bindings.output_node).is_none() {
            return Err(RelayError::Workflow(format!(
                "output node {} is not in the template",
                bindings.output_node
            )));
        }

        Ok(Self { template, bindings })
    }

    /// The node bindings in use.
    #[must_use]
    pub fn bindings(&self) -> &WorkflowBindings {
        &self.bindings
    }

    /// A copy of the template with the prompt, the staged image and a fresh random seed set.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound input can't be written.
    pub fn patch(&self, prompt: &str, image_filename: &str) -> Result<Value, RelayError> {
        self.patch_with_seed(prompt, image_filename, random_seed())
    }

    /// Like [`Workflow::patch`] with an explicit seed.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound input can't be written.
    pub fn patch_with_seed(
        &self,
        prompt: &str,
        image_filename: &str,
        seed: u32,
    ) -> Result<Value, RelayError> {
        let b = &self.bindings;
        let mut workflow = self.template.clone();
        set_input(&mut workflow, &b.prompt_node, &b.prompt_field, Value::from(prompt))?;
        set_input(&mut workflow, &b.image_node, &b.image_field, Value::from(image_filename))?;
        set_input(&mut workflow, &b.seed_node, &b.seed_field, Value::from(seed))?;
        Ok(workflow)
    }
}

fn set_input(workflow: &mut Value, node: &str, field: &str, value: Value) -> Result<(), RelayError> {
    let slot = workflow
        .get_mut(node)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(|inputs| inputs.get_mut(field))
        .ok_or_else(|| RelayError::Workflow(format!("node {node} has no input '{field}'")))?;
    *slot = value;
    Ok(())
}

/// Uniformly random seed in `[0, MAX_SEED]`.
#[must_use]
pub fn random_seed() -> u32 {
    rand::rng().random_range(0..=MAX_SEED)
}
