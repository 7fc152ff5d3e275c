//! Resolution engine turning a [`Command`], a [`Wrapper`], and the
//! caller's runtime values into a launch-ready
//! [`ResolvedCommand`](launchbox_api::resolved::ResolvedCommand), or a
//! precise error naming what is wrong.
//!
//! The engine is synchronous and side-effect free except through its
//! [`collaborators`]: host-object lookup, permission checks, filesystem
//! staging, server configuration, and sub-command lookup all go through
//! trait seams so the caller decides what platform backs them.

pub mod collaborators;
pub mod constraints;
pub mod errors;
pub mod query;

mod mounts;
mod objects;
mod outputs;
mod template;
mod tree;

use indexmap::IndexMap;
use launchbox_api::command::{Command, CommandKind};
use launchbox_api::resolved::{PartiallyResolvedCommand, ResolvedCommand};
use launchbox_api::wrapper::Wrapper;
use tracing::info;

use crate::collaborators::{Collaborators, UserContext};
use crate::errors::{Error, Result};
use crate::template::TemplateContext;
use crate::tree::{InputForest, ResolveCtx};

pub use crate::tree::kinds_requiring_detail;

/// Everything the caller supplies at launch time.
#[derive(Clone, Debug, Default)]
pub struct RuntimeValues {
	/// Values keyed by input name, wrapper and command inputs alike.
	pub inputs: IndexMap<String, String>,
	/// Selections for user-settable placement constraints, keyed by
	/// constraint attribute.
	pub constraint_selections: IndexMap<String, String>,
}

impl RuntimeValues {
	pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.inputs.insert(name.into(), value.into());
		self
	}
}

pub struct Resolver<'a> {
	collaborators: Collaborators<'a>,
	user: UserContext,
}

impl<'a> Resolver<'a> {
	pub fn new(collaborators: Collaborators<'a>, user: UserContext) -> Self {
		Resolver {
			collaborators,
			user,
		}
	}

	/// Resolves the input trees only, tolerating ambiguity and missing
	/// values. Used to render launch forms before the caller commits.
	pub fn pre_resolve(
		&self,
		command: &Command,
		wrapper: &Wrapper,
		runtime: &RuntimeValues,
	) -> Result<PartiallyResolvedCommand> {
		let command_json = serde_json::to_value(command)?;
		let wrapper_json = serde_json::to_value(wrapper)?;
		let forest = InputForest::build(command, wrapper)?;
		let ctx = ResolveCtx {
			collaborators: &self.collaborators,
			user: &self.user,
			runtime: &runtime.inputs,
			command_json: &command_json,
			wrapper_json: &wrapper_json,
		};
		let trees = forest.resolve(&ctx)?;
		Ok(PartiallyResolvedCommand {
			command_name: command.name.clone(),
			command_description: command.description.clone(),
			wrapper_name: wrapper.name.clone(),
			wrapper_description: wrapper.description.clone(),
			image: command.image.clone(),
			kind: command.kind,
			override_entrypoint: command.override_entrypoint,
			raw_input_values: runtime.inputs.clone(),
			input_trees: trees,
		})
	}

	/// Full, strict resolution to a launch-ready specification.
	pub fn resolve(
		&self,
		command: &Command,
		wrapper: &Wrapper,
		runtime: &RuntimeValues,
	) -> Result<ResolvedCommand> {
		let command_json = serde_json::to_value(command)?;
		let wrapper_json = serde_json::to_value(wrapper)?;

		let forest = InputForest::build(command, wrapper)?;
		let ctx = ResolveCtx {
			collaborators: &self.collaborators,
			user: &self.user,
			runtime: &runtime.inputs,
			command_json: &command_json,
			wrapper_json: &wrapper_json,
		};
		let trees = forest.resolve(&ctx)?;

		let flattened = tree::flatten(&trees, true)?;
		let missing = tree::missing_required_inputs(&trees);
		if !missing.is_empty() {
			return Err(Error::MissingRequiredInputs { inputs: missing });
		}
		let mut command_line_map = forest.seeded_command_line().clone();
		command_line_map.extend(
			flattened
				.command_line
				.iter()
				.map(|(k, v)| (k.clone(), v.clone())),
		);

		let values = TemplateContext {
			replacements: &flattened.replacements,
			command_json: &command_json,
			wrapper_json: &wrapper_json,
		};
		let command_line_values = TemplateContext {
			replacements: &command_line_map,
			command_json: &command_json,
			wrapper_json: &wrapper_json,
		};

		let command_line = values_of_command_line(command, &command_line_values)?;
		let working_directory = values.resolve_optional(command.working_directory.as_deref())?;

		let mut environment_variables = IndexMap::new();
		for (name, value_template) in &command.environment_variables {
			environment_variables.insert(name.clone(), values.resolve(value_template)?);
		}
		let mut ports = IndexMap::new();
		for (container_port, host_port_template) in &command.ports {
			ports.insert(container_port.clone(), values.resolve(host_port_template)?);
		}

		let (resolved_mounts, setup_requests) =
			mounts::resolve_mounts(command, &trees, &values, &self.collaborators)?;
		let (resolved_outputs, wrapup_requests) = outputs::resolve_outputs(
			command,
			wrapper,
			&trees,
			&resolved_mounts,
			&values,
			&self.collaborators,
			&self.user,
		)?;

		let setup_commands = setup_requests
			.iter()
			.map(|request| {
				self.build_auxiliary(
					CommandKind::Setup,
					&request.image,
					&request.input_host_path,
					&request.input_container_host_path,
					&request.output_host_path,
					&request.output_container_host_path,
					&request.mount_name,
					&environment_variables,
					&command_line_values,
				)
			})
			.collect::<Result<Vec<_>>>()?;
		let wrapup_commands = wrapup_requests
			.iter()
			.map(|request| {
				self.build_auxiliary(
					CommandKind::Wrapup,
					&request.image,
					&request.input_host_path,
					&request.input_container_host_path,
					&request.output_host_path,
					&request.output_container_host_path,
					&request.output_name,
					&environment_variables,
					&command_line_values,
				)
			})
			.collect::<Result<Vec<_>>>()?;

		let swarm_constraints = constraints::resolve_placement_constraints(
			self.collaborators.server,
			&runtime.constraint_selections,
		);

		info!(
			command = command.name,
			wrapper = wrapper.name,
			mounts = resolved_mounts.len(),
			outputs = resolved_outputs.len(),
			"resolved command"
		);

		Ok(ResolvedCommand {
			command_name: command.name.clone(),
			command_description: command.description.clone(),
			wrapper_name: wrapper.name.clone(),
			wrapper_description: wrapper.description.clone(),
			image: command.image.clone(),
			kind: command.kind,
			override_entrypoint: command.override_entrypoint,
			command_line,
			working_directory,
			environment_variables,
			ports,
			raw_input_values: runtime.inputs.clone(),
			input_trees: trees,
			mounts: resolved_mounts,
			outputs: resolved_outputs,
			setup_commands,
			wrapup_commands,
			reserve_memory: command.reserve_memory,
			limit_memory: command.limit_memory,
			limit_cpu: command.limit_cpu,
			shm_size: command.shm_size,
			generic_resources: command.generic_resources.clone(),
			swarm_constraints,
			parent_source_object: None,
		})
	}

	#[allow(clippy::too_many_arguments)]
	fn build_auxiliary(
		&self,
		role: CommandKind,
		via: &str,
		input_host_path: &str,
		input_container_host_path: &str,
		output_host_path: &str,
		output_container_host_path: &str,
		parent_source_object: &str,
		parent_environment: &IndexMap<String, String>,
		command_line_values: &TemplateContext,
	) -> Result<ResolvedCommand> {
		let role_name = match role {
			CommandKind::Setup => "setup",
			CommandKind::Wrapup => "wrap-up",
			CommandKind::Run => "run",
		};
		let (image, name) = split_image_and_name(via);
		let sub = self
			.collaborators
			.subcommands
			.command_for_image(image, name)
			.ok_or_else(|| Error::Subcommand {
				role: role_name,
				image: image.to_owned(),
				reason: "no command is declared for the image".into(),
			})?;
		if sub.kind != role {
			return Err(Error::Subcommand {
				role: role_name,
				image: image.to_owned(),
				reason: format!(
					"the declared command is a {:?} command",
					sub.kind
				)
				.to_lowercase(),
			});
		}

		let mut auxiliary = ResolvedCommand::auxiliary(
			&sub,
			input_host_path,
			input_container_host_path,
			output_host_path,
			output_container_host_path,
			parent_source_object,
		);
		// The parent's resolved environment wins over the sub-command's
		// own declarations.
		for (name, value) in parent_environment {
			auxiliary
				.environment_variables
				.insert(name.clone(), value.clone());
		}
		auxiliary.command_line = auxiliary
			.command_line
			.as_deref()
			.map(|t| command_line_values.resolve(t))
			.transpose()?;
		Ok(auxiliary)
	}
}

fn values_of_command_line(
	command: &Command,
	command_line_values: &TemplateContext,
) -> Result<Option<String>> {
	command
		.command_line
		.as_deref()
		.map(|template| command_line_values.resolve(template))
		.transpose()
}

/// A setup or wrap-up reference is an image, optionally followed by a
/// third colon-separated segment naming the command when several are
/// declared for one image, e.g. `busybox:latest:unzip`.
fn split_image_and_name(via: &str) -> (&str, Option<&str>) {
	let segments = via.split(':').count();
	if segments < 3 {
		return (via, None);
	}
	match via.rfind(':') {
		Some(idx) => (&via[..idx], Some(&via[idx + 1..])),
		None => (via, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn via_references_split_off_a_trailing_command_name() {
		assert_eq!(split_image_and_name("busybox"), ("busybox", None));
		assert_eq!(
			split_image_and_name("busybox:latest"),
			("busybox:latest", None)
		);
		assert_eq!(
			split_image_and_name("busybox:latest:unzip"),
			("busybox:latest", Some("unzip"))
		);
	}
}
