use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::command::{
	replacement_key, Command, CommandInput, CommandKind, InputKind, MountName,
};
use crate::wrapper::{DerivedInput, ExternalInput, HandlerKind};

/// A host-system record matched during input resolution. The serialized
/// JSON is kept so derived children can be computed from it without
/// further collaborator round-trips.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedObject {
	pub kind: InputKind,
	/// Canonical reference string, also used as the input's value.
	pub uri: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	pub json: serde_json::Value,
}

/// One concrete value for one input node occurrence.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedValue {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<String>,
	/// Human-facing label, used in previews.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object: Option<ResolvedObject>,
}

impl ResolvedValue {
	pub fn literal(value: impl Into<String>) -> Self {
		let value = value.into();
		ResolvedValue {
			label: Some(value.clone()),
			value: Some(value),
			object: None,
		}
	}
}

/// The declaration behind one input tree node.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputSource {
	External(ExternalInput),
	Derived(DerivedInput),
	Command(CommandInput),
}

impl InputSource {
	pub fn kind(&self) -> InputKind {
		match self {
			InputSource::External(input) => input.kind,
			InputSource::Derived(input) => input.kind,
			InputSource::Command(input) => input.kind,
		}
	}

	pub fn required(&self) -> bool {
		match self {
			InputSource::External(input) => input.required,
			InputSource::Derived(input) => input.required,
			InputSource::Command(input) => input.required,
		}
	}

	pub fn default_value(&self) -> Option<&str> {
		match self {
			InputSource::External(input) => input.default_value.as_deref(),
			InputSource::Derived(input) => input.default_value.as_deref(),
			InputSource::Command(input) => input.default_value.as_deref(),
		}
	}

	pub fn matcher(&self) -> Option<&str> {
		match self {
			InputSource::External(input) => input.matcher.as_deref(),
			InputSource::Derived(input) => input.matcher.as_deref(),
			InputSource::Command(input) => input.matcher.as_deref(),
		}
	}

	pub fn replacement_key(&self, name: &str) -> String {
		let declared = match self {
			InputSource::External(input) => input.replacement_key.as_deref(),
			InputSource::Derived(input) => input.replacement_key.as_deref(),
			InputSource::Command(input) => input.replacement_key.as_deref(),
		};
		replacement_key(name, declared)
	}

	/// Fan-out to several values is only legal for derived inputs that
	/// opt in.
	pub fn multiple(&self) -> bool {
		matches!(self, InputSource::Derived(input) if input.multiple)
	}

	pub fn provides_value_for_command_input(&self) -> Option<&str> {
		match self {
			InputSource::External(input) => input.provides_value_for_command_input.as_deref(),
			InputSource::Derived(input) => input.provides_value_for_command_input.as_deref(),
			InputSource::Command(_) => None,
		}
	}

	pub fn provides_files_for_command_mount(&self) -> Option<&str> {
		match self {
			InputSource::External(input) => {
				input.provides_files_for_command_mount.as_ref().map(|m| m.0.as_str())
			}
			InputSource::Derived(input) => {
				input.provides_files_for_command_mount.as_ref().map(|m| m.0.as_str())
			}
			InputSource::Command(_) => None,
		}
	}

	pub fn via_setup_command(&self) -> Option<&str> {
		match self {
			InputSource::External(input) => input.via_setup_command.as_deref(),
			InputSource::Derived(input) => input.via_setup_command.as_deref(),
			InputSource::Command(_) => None,
		}
	}

	pub fn load_children(&self) -> bool {
		match self {
			InputSource::External(input) => input.load_children,
			InputSource::Derived(input) => input.load_children,
			InputSource::Command(_) => false,
		}
	}
}

/// A resolved input node: the declaration plus one (value, children) pair
/// per value the node fanned out to.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedInputTree {
	pub name: String,
	pub source: InputSource,
	pub values: Vec<ValueAndChildren>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ValueAndChildren {
	pub value: ResolvedValue,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<ResolvedInputTree>,
}

impl ResolvedInputTree {
	/// The node's value, when it resolved to exactly one.
	pub fn unique_value(&self) -> Option<&ResolvedValue> {
		match self.values.as_slice() {
			[single] => Some(&single.value),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedMount {
	pub name: MountName,
	pub writable: bool,
	/// In-container path, template-resolved.
	pub container_path: String,
	/// Path on the host data system.
	pub host_path: String,
	/// `host_path` after the configured prefix translation.
	pub container_host_path: String,
	/// Wrapper input that provided the files, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from_wrapper_input: Option<String>,
	/// Image of the setup command staging this mount, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_setup_command: Option<String>,
}

/// Where a resolved output uploads to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputTarget {
	/// A wrapper input holding a host-object value.
	Input(String),
	/// Another output handler, which creates the parent object.
	Handler(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedOutput {
	/// `<command output>:<handler>`, unique within the resolved command.
	pub name: String,
	pub from_command_output: String,
	pub from_output_handler: String,
	pub required: bool,
	pub mount: MountName,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub glob: Option<String>,
	pub kind: HandlerKind,
	pub target: OutputTarget,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub format: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_wrapup_command: Option<String>,
}

/// Result of a lightweight pre-resolution pass: enough to render a launch
/// form, tolerant of gaps a full resolution would reject.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartiallyResolvedCommand {
	pub command_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_description: Option<String>,
	pub wrapper_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wrapper_description: Option<String>,
	pub image: String,
	pub kind: CommandKind,
	pub override_entrypoint: bool,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub raw_input_values: IndexMap<String, String>,
	pub input_trees: Vec<ResolvedInputTree>,
}

/// The terminal artifact: a fully concrete, ready-to-launch container
/// specification. Consumed by the external launch collaborator; nothing
/// in this core persists it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedCommand {
	pub command_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_description: Option<String>,
	pub wrapper_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wrapper_description: Option<String>,
	pub image: String,
	pub kind: CommandKind,
	pub override_entrypoint: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_line: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub working_directory: Option<String>,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub environment_variables: IndexMap<String, String>,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub ports: IndexMap<String, String>,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub raw_input_values: IndexMap<String, String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub input_trees: Vec<ResolvedInputTree>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub mounts: Vec<ResolvedMount>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub outputs: Vec<ResolvedOutput>,
	/// Setup specifications to run before the main container.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub setup_commands: Vec<ResolvedCommand>,
	/// Wrap-up specifications to run after the main container.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub wrapup_commands: Vec<ResolvedCommand>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reserve_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit_cpu: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub shm_size: Option<u64>,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub generic_resources: IndexMap<String, String>,
	/// Flat ordered placement constraint list, absent when the server is
	/// not in cluster mode or declares none.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub swarm_constraints: Option<Vec<String>>,
	/// For auxiliary specs: the mount (setup) or output (wrap-up) of the
	/// parent command this spec was generated for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_source_object: Option<String>,
}

impl ResolvedCommand {
	pub const AUX_INPUT_MOUNT: &'static str = "input";
	pub const AUX_OUTPUT_MOUNT: &'static str = "output";

	/// Builds the specification for a generated setup or wrap-up
	/// sub-command: the staged input path mounted read-only at `/input`,
	/// a fresh writable directory at `/output`, and the sub-command's
	/// own templates carried over for later population.
	pub fn auxiliary(
		command: &Command,
		input_host_path: &str,
		input_container_host_path: &str,
		output_host_path: &str,
		output_container_host_path: &str,
		parent_source_object: &str,
	) -> ResolvedCommand {
		ResolvedCommand {
			command_name: command.name.clone(),
			command_description: command.description.clone(),
			wrapper_name: String::new(),
			wrapper_description: None,
			image: command.image.clone(),
			kind: command.kind,
			override_entrypoint: command.override_entrypoint,
			command_line: command.command_line.clone(),
			working_directory: command.working_directory.clone(),
			environment_variables: command.environment_variables.clone(),
			ports: IndexMap::new(),
			raw_input_values: IndexMap::new(),
			input_trees: Vec::new(),
			mounts: vec![
				ResolvedMount {
					name: MountName(Self::AUX_INPUT_MOUNT.into()),
					writable: false,
					container_path: "/input".into(),
					host_path: input_host_path.into(),
					container_host_path: input_container_host_path.into(),
					from_wrapper_input: None,
					via_setup_command: None,
				},
				ResolvedMount {
					name: MountName(Self::AUX_OUTPUT_MOUNT.into()),
					writable: true,
					container_path: "/output".into(),
					host_path: output_host_path.into(),
					container_host_path: output_container_host_path.into(),
					from_wrapper_input: None,
					via_setup_command: None,
				},
			],
			outputs: Vec::new(),
			setup_commands: Vec::new(),
			wrapup_commands: Vec::new(),
			reserve_memory: command.reserve_memory,
			limit_memory: command.limit_memory,
			limit_cpu: command.limit_cpu,
			shm_size: command.shm_size,
			generic_resources: command.generic_resources.clone(),
			swarm_constraints: None,
			parent_source_object: Some(parent_source_object.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unique_value_requires_exactly_one() {
		let mut tree = ResolvedInputTree {
			name: "scan".into(),
			source: InputSource::Derived(DerivedInput {
				kind: InputKind::Scan,
				derived_from_wrapper_input: "session".into(),
				..Default::default()
			}),
			values: vec![],
		};
		assert!(tree.unique_value().is_none());

		tree.values.push(ValueAndChildren {
			value: ResolvedValue::literal("/data/sessions/1/scans/2"),
			children: vec![],
		});
		assert!(tree.unique_value().is_some());

		tree.values.push(ValueAndChildren {
			value: ResolvedValue::literal("/data/sessions/1/scans/3"),
			children: vec![],
		});
		assert!(tree.unique_value().is_none());
	}

	#[test]
	fn auxiliary_spec_mounts_input_and_output() {
		let command = Command {
			name: "unzip-dicom".into(),
			label: None,
			description: None,
			image: "example.org/unzip:1.0".into(),
			kind: CommandKind::Setup,
			command_line: Some("unzip /input/*.zip -d /output".into()),
			override_entrypoint: false,
			working_directory: None,
			environment_variables: IndexMap::new(),
			ports: IndexMap::new(),
			inputs: IndexMap::new(),
			outputs: Vec::new(),
			mounts: Vec::new(),
			reserve_memory: None,
			limit_memory: None,
			limit_cpu: None,
			shm_size: None,
			generic_resources: IndexMap::new(),
		};

		let spec = ResolvedCommand::auxiliary(
			&command,
			"/data/archive/zips",
			"/docker/archive/zips",
			"/data/build/abc",
			"/docker/build/abc",
			"dicom-mount",
		);

		assert_eq!(spec.mounts.len(), 2);
		assert!(!spec.mounts[0].writable);
		assert_eq!(spec.mounts[0].container_path, "/input");
		assert!(spec.mounts[1].writable);
		assert_eq!(spec.mounts[1].container_host_path, "/docker/build/abc");
		assert_eq!(spec.parent_source_object.as_deref(), Some("dicom-mount"));
	}
}
