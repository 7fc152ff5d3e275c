//! Output resolution: matching declared command outputs with the
//! wrapper's handlers and deciding where each upload lands.

use indexmap::IndexMap;
use launchbox_api::command::{Command, CommandOutput};
use launchbox_api::resolved::{OutputTarget, ResolvedMount, ResolvedOutput};
use launchbox_api::wrapper::{HandlerKind, OutputHandler, Wrapper};
use tracing::{debug, warn};

use crate::collaborators::{Collaborators, HostObject, UserContext};
use crate::errors::{Error, Result};
use crate::mounts;
use crate::template::TemplateContext;
use crate::tree;

/// A wrap-up command to generate and run after the main container: the
/// output's mount content goes in read-only, and the wrap-up's own
/// output directory is what gets uploaded instead.
pub struct WrapupRequest {
	pub image: String,
	pub output_name: String,
	pub input_host_path: String,
	pub input_container_host_path: String,
	pub output_host_path: String,
	pub output_container_host_path: String,
}

struct OutputState {
	valid: bool,
	first_failure: Option<String>,
}

pub(crate) fn resolve_outputs(
	command: &Command,
	wrapper: &Wrapper,
	trees: &[launchbox_api::resolved::ResolvedInputTree],
	resolved_mounts: &[ResolvedMount],
	templates: &TemplateContext,
	collaborators: &Collaborators,
	user: &UserContext,
) -> Result<(Vec<ResolvedOutput>, Vec<WrapupRequest>)> {
	let mut states: IndexMap<&str, OutputState> = command
		.outputs
		.iter()
		.map(|output| {
			(
				output.name.as_str(),
				OutputState {
					valid: false,
					first_failure: None,
				},
			)
		})
		.collect();

	let mut outputs = Vec::new();
	let mut wrapups = Vec::new();

	// Handlers resolve in their declaration order, which is also the
	// upload order.
	for (handler_name, handler) in &wrapper.output_handlers {
		let Some(output) = command
			.outputs
			.iter()
			.find(|o| o.name == handler.accepts_command_output)
		else {
			warn!(
				handler = handler_name,
				output = handler.accepts_command_output,
				"handler names a command output that does not exist, ignoring"
			);
			continue;
		};

		match validate_target(handler, wrapper, trees, collaborators, user) {
			Ok(target) => {
				if let Some(state) = states.get_mut(output.name.as_str()) {
					state.valid = true;
				}
				let resolved =
					build_output(output, handler_name, handler, target, templates)?;
				if let Some(image) = handler.via_wrapup_command.as_deref() {
					wrapups.push(build_wrapup_request(
						image,
						&resolved,
						resolved_mounts,
						collaborators,
					)?);
				}
				outputs.push(resolved);
			}
			Err(reason) => {
				debug!(handler = handler_name, reason, "output handler not usable");
				if let Some(state) = states.get_mut(output.name.as_str()) {
					state.first_failure.get_or_insert(reason);
				}
			}
		}
	}

	for output in &command.outputs {
		let Some(state) = states.get(output.name.as_str()) else {
			continue;
		};
		if output.required && !state.valid {
			let reason = state
				.first_failure
				.clone()
				.unwrap_or_else(|| "no output handler accepts it".to_owned());
			return Err(Error::output(&output.name, reason));
		}
	}

	Ok((outputs, wrapups))
}

/// A handler may upload onto a wrapper input's resolved record, given
/// edit permission, or chain a resource onto another handler that
/// creates an assessor or scan.
fn validate_target(
	handler: &OutputHandler,
	wrapper: &Wrapper,
	trees: &[launchbox_api::resolved::ResolvedInputTree],
	collaborators: &Collaborators,
	user: &UserContext,
) -> std::result::Result<OutputTarget, String> {
	let target = handler.target.as_str();

	let target_node = tree::walk(trees).into_iter().find(|node| node.name == target);
	if let Some(node) = target_node {
		let Some(value) = node.unique_value() else {
			return Err(format!(
				"input \"{target}\" did not resolve to exactly one value"
			));
		};
		let Some(object) = &value.object else {
			return Err(format!("input \"{target}\" does not hold a record"));
		};
		let host_object = HostObject::new(object.kind, object.json.clone());
		if !collaborators.permissions.can_edit(user, &host_object) {
			return Err(format!(
				"user \"{}\" does not have permission to edit {}",
				user.username,
				crate::objects::describe(&host_object)
			));
		}
		return Ok(OutputTarget::Input(target.to_owned()));
	}

	if let Some(parent) = wrapper.output_handlers.get(target) {
		if handler.kind != HandlerKind::Resource {
			return Err(format!(
				"only resource handlers may target another handler, this one creates {}",
				handler.kind.name()
			));
		}
		if !parent.kind.supports_child_handlers() {
			return Err(format!(
				"handler \"{target}\" creates a {}, which cannot receive resources",
				parent.kind.name()
			));
		}
		return Ok(OutputTarget::Handler(target.to_owned()));
	}

	Err(format!(
		"target \"{target}\" is neither a resolvable input nor another handler"
	))
}

fn build_output(
	output: &CommandOutput,
	handler_name: &str,
	handler: &OutputHandler,
	target: OutputTarget,
	templates: &TemplateContext,
) -> Result<ResolvedOutput> {
	Ok(ResolvedOutput {
		name: format!("{}:{}", output.name, handler_name),
		from_command_output: output.name.clone(),
		from_output_handler: handler_name.to_owned(),
		required: output.required,
		mount: output.mount.clone(),
		glob: output.glob.clone(),
		kind: handler.kind,
		target,
		path: templates.resolve_optional(output.path.as_deref())?,
		label: templates.resolve_optional(handler.label.as_deref())?,
		format: templates.resolve_optional(handler.format.as_deref())?,
		via_wrapup_command: handler.via_wrapup_command.clone(),
	})
}

fn build_wrapup_request(
	image: &str,
	output: &ResolvedOutput,
	resolved_mounts: &[ResolvedMount],
	collaborators: &Collaborators,
) -> Result<WrapupRequest> {
	let mount = resolved_mounts
		.iter()
		.find(|m| m.name == output.mount)
		.ok_or_else(|| {
			Error::output(
				&output.name,
				format!("mount \"{}\" was not resolved", output.mount),
			)
		})?;
	let fresh = mounts::new_build_directory(collaborators, &output.name)?;
	Ok(WrapupRequest {
		image: image.to_owned(),
		output_name: output.name.clone(),
		input_host_path: mount.host_path.clone(),
		input_container_host_path: mount.container_host_path.clone(),
		output_host_path: fresh.clone(),
		output_container_host_path: mounts::translate(collaborators, &fresh),
	})
}
