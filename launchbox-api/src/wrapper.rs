use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::command::{InputKind, MountName};

/// A named adaptation of a [`Command`](crate::command::Command) to a
/// concrete set of host-system object kinds. The wrapper declares which
/// values the caller supplies (external inputs), which are derived from
/// them, and where command outputs land on the host system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Wrapper {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Root-level inputs, supplied by the caller at launch time.
	/// Declaration order is semantic.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub external_inputs: IndexMap<String, ExternalInput>,
	/// Inputs computed from a parent input's resolved record.
	/// Each must name an already-declared input as its parent.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub derived_inputs: IndexMap<String, DerivedInput>,
	/// Rules mapping command outputs onto host-system objects.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub output_handlers: IndexMap<String, OutputHandler>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExternalInput {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, rename = "type")]
	pub kind: InputKind,
	#[serde(default)]
	pub required: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_value: Option<String>,
	/// Filter expression applied to a candidate record's JSON.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub matcher: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub replacement_key: Option<String>,
	/// Name of the command input this input feeds, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provides_value_for_command_input: Option<String>,
	/// Name of the command mount this input provides files for, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provides_files_for_command_mount: Option<MountName>,
	/// Image of a setup command that stages this input's mount.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_setup_command: Option<String>,
	/// Load the record's child collections eagerly when resolving it.
	#[serde(default)]
	pub load_children: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DerivedInput {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, rename = "type")]
	pub kind: InputKind,
	#[serde(default)]
	pub required: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub matcher: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub replacement_key: Option<String>,
	/// Name of the wrapper input this input is derived from. Must be
	/// declared before this input.
	pub derived_from_wrapper_input: String,
	/// Property pulled from the parent record for string-kind inputs.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub derived_from_property: Option<String>,
	/// Permit fan-out to several values; the values are aggregated into
	/// one command-line substitution through the fed command input.
	#[serde(default)]
	pub multiple: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provides_value_for_command_input: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provides_files_for_command_mount: Option<MountName>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_setup_command: Option<String>,
	#[serde(default)]
	pub load_children: bool,
}

/// What a handler creates on the host system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
	#[default]
	Resource,
	Assessor,
	Scan,
}

impl HandlerKind {
	/// Handler kinds that may receive a chained resource handler.
	pub fn supports_child_handlers(&self) -> bool {
		matches!(self, HandlerKind::Assessor | HandlerKind::Scan)
	}

	pub fn name(&self) -> &'static str {
		match self {
			HandlerKind::Resource => "resource",
			HandlerKind::Assessor => "assessor",
			HandlerKind::Scan => "scan",
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputHandler {
	#[serde(default, rename = "type")]
	pub kind: HandlerKind,
	/// Name of the command output this handler accepts.
	pub accepts_command_output: String,
	/// Where the output goes: the name of a wrapper input whose resolved
	/// value is a host object, or the name of another handler to chain
	/// onto.
	pub target: String,
	/// Label template for the created object.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	/// Format template for the created object.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub format: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Image of a wrap-up command that post-processes the output mount.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub via_wrapup_command: Option<String>,
}
