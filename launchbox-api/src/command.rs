use derive_more::{Display, FromStr};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A reusable declaration of a containerized tool: image, command-line
/// template, typed inputs, outputs, mounts, and resource limits.
///
/// Commands are authored externally and are read-only to the resolution
/// engine. All template fields may contain replacement keys (`#NAME#` by
/// default) and at most one embedded query expression delimited by `^`
/// markers (see `launchbox-resolver`).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Command {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub image: String,
	#[serde(default, rename = "type")]
	pub kind: CommandKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_line: Option<String>,
	#[serde(default)]
	pub override_entrypoint: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub working_directory: Option<String>,
	/// Environment variable templates, name -> value template.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub environment_variables: IndexMap<String, String>,
	/// Port templates, container port -> host port template.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub ports: IndexMap<String, String>,
	/// Input declarations, keyed by input name. Declaration order is
	/// semantic: it drives tree-building and substitution order.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub inputs: IndexMap<String, CommandInput>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub outputs: Vec<CommandOutput>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub mounts: Vec<CommandMount>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reserve_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit_cpu: Option<f64>,
	/// Shared-memory size in bytes for the container's /dev/shm.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub shm_size: Option<u64>,
	/// Generic cluster resource requests, name -> value.
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub generic_resources: IndexMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
	#[default]
	Run,
	Setup,
	Wrapup,
}

/// The type tag of an input value. Scalar kinds pass through as strings;
/// object kinds name a record in the host data system and resolve through
/// the host-object collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
	#[default]
	String,
	Boolean,
	Number,
	File,
	Files,
	Directory,
	Project,
	Subject,
	Session,
	Scan,
	Assessor,
	Resource,
}

impl InputKind {
	/// Kinds whose values are serialized host-system records.
	pub fn is_object(&self) -> bool {
		use InputKind::*;
		matches!(self, Project | Subject | Session | Scan | Assessor | Resource | File)
	}

	/// Kinds a caller may name directly by id, URI, or inline JSON.
	/// Files are only reachable by derivation from a resource.
	pub fn is_root_object(&self) -> bool {
		use InputKind::*;
		matches!(self, Project | Subject | Session | Scan | Assessor | Resource)
	}

	pub fn all() -> &'static [InputKind] {
		use InputKind::*;
		&[
			String, Boolean, Number, File, Files, Directory, Project, Subject, Session, Scan,
			Assessor, Resource,
		]
	}

	pub fn name(&self) -> &'static str {
		use InputKind::*;
		match self {
			String => "string",
			Boolean => "boolean",
			Number => "number",
			File => "file",
			Files => "files",
			Directory => "directory",
			Project => "project",
			Subject => "subject",
			Session => "session",
			Scan => "scan",
			Assessor => "assessor",
			Resource => "resource",
		}
	}

	/// How a value of this kind is extracted from a parent value of kind
	/// `parent`. `None` means the pairing is unsupported and derivation
	/// yields an empty value set.
	pub fn derivation_from(&self, parent: InputKind) -> Option<Derivation> {
		use InputKind::*;
		match (parent, *self) {
			// Scalar property pull works from any serialized record.
			(p, String) if p.is_object() => Some(Derivation::Property),
			(Resource, Directory) => Some(Derivation::DirectoryProperty),
			(Resource, File) | (Resource, Files) => Some(Derivation::MatchChildren {
				collection: "files",
				match_properties: &["name"],
			}),
			(Project, Subject) => Some(Derivation::MatchChildren {
				collection: "subjects",
				match_properties: &["id", "label", "uri"],
			}),
			(Subject, Session) => Some(Derivation::MatchChildren {
				collection: "sessions",
				match_properties: &["id", "label", "uri"],
			}),
			(Session, Scan) => Some(Derivation::MatchChildren {
				collection: "scans",
				match_properties: &["id", "uri"],
			}),
			(Session, Assessor) => Some(Derivation::MatchChildren {
				collection: "assessors",
				match_properties: &["label", "id", "uri"],
			}),
			(Project | Subject | Session | Scan | Assessor, Resource) => {
				Some(Derivation::MatchChildren {
					collection: "resources",
					match_properties: &["label", "id", "uri"],
				})
			}
			// Upward navigation re-resolves through the host-object
			// collaborator using a reference stored on the parent record.
			(Session, Subject) => Some(Derivation::ParentReference {
				property: "subject-uri",
			}),
			(Scan | Assessor, Session) => Some(Derivation::ParentReference {
				property: "session-uri",
			}),
			(Subject | Session, Project) => Some(Derivation::ParentReference {
				property: "project-uri",
			}),
			_ => None,
		}
	}
}

/// Extraction rule for one (parent kind, child kind) pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Derivation {
	/// Pull the scalar property named by the derived input's `property`.
	Property,
	/// Pull the parent record's `directory` property.
	DirectoryProperty,
	/// Match 0..N records under a named array of the parent record,
	/// trying each match property in order against the supplied value.
	MatchChildren {
		collection: &'static str,
		match_properties: &'static [&'static str],
	},
	/// Follow a reference property on the parent record through the
	/// host-object collaborator.
	ParentReference { property: &'static str },
}

/// An input to the command line itself. Fed either directly by the caller
/// or by the wrapper input that declares it as its value target.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandInput {
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
	/// Placeholder substituted in templates; defaults to `#NAME#`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub replacement_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_line_flag: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command_line_separator: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub true_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub false_value: Option<String>,
	/// Accept a JSON string-array value and join it per the delimiter.
	#[serde(default)]
	pub multi_select: bool,
	#[serde(default)]
	pub multiple_delimiter: MultipleDelimiter,
}

/// How a list of values for one command input is joined into a single
/// command-line substitution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultipleDelimiter {
	#[default]
	Space,
	Comma,
	QuotedSpace,
	/// Repeat the input's flag and separator before every value.
	Flag,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandOutput {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub required: bool,
	/// Name of the declared mount the output files land in.
	pub mount: MountName,
	/// Path template relative to the mount, may be empty.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub glob: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, FromStr, Display)]
pub struct MountName(pub String);

impl std::borrow::Borrow<String> for MountName {
	fn borrow(&self) -> &String {
		&self.0
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandMount {
	pub name: MountName,
	#[serde(default)]
	pub writable: bool,
	/// In-container path template.
	pub path: String,
}

impl Command {
	pub fn mount(&self, name: &str) -> Option<&CommandMount> {
		self.mounts.iter().find(|m| m.name.0 == name)
	}
}

/// Replacement key for an input: the declared override, or `#NAME#`.
pub fn replacement_key(name: &str, declared: Option<&str>) -> String {
	match declared {
		Some(key) if !key.is_empty() => key.to_owned(),
		_ => format!("#{name}#"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::test_common::assert_eq_json_roundtrip;
	use expect_test::expect;

	#[test]
	fn test_roundtrip() {
		let expect = expect![[r##"
            {
              "name": "tissue-segment",
              "image": "example.org/segment:2.1",
              "type": "run",
              "command-line": "segment #THRESHOLD# /input /output",
              "override-entrypoint": true,
              "environment-variables": {
                "SEGMENT_CACHE": "/cache"
              },
              "inputs": {
                "threshold": {
                  "type": "number",
                  "required": true,
                  "default-value": "0.5",
                  "replacement-key": "#THRESHOLD#",
                  "command-line-flag": "--threshold",
                  "multi-select": false,
                  "multiple-delimiter": "space"
                }
              },
              "outputs": [
                {
                  "name": "labels",
                  "required": true,
                  "mount": "out",
                  "path": "labels"
                }
              ],
              "mounts": [
                {
                  "name": "in",
                  "writable": false,
                  "path": "/input"
                },
                {
                  "name": "out",
                  "writable": true,
                  "path": "/output"
                }
              ],
              "limit-memory": 4294967296,
              "shm-size": 536870912
            }"##]];
		assert_eq_json_roundtrip::<Command>(&expect);
	}

	#[test]
	fn derivation_table_rejects_unknown_pairings() {
		assert_eq!(InputKind::Scan.derivation_from(InputKind::Project), None);
		assert_eq!(InputKind::Boolean.derivation_from(InputKind::Resource), None);
		assert_eq!(InputKind::Directory.derivation_from(InputKind::Session), None);
	}

	#[test]
	fn derivation_table_scalar_pull_from_any_record() {
		for parent in [InputKind::Project, InputKind::Scan, InputKind::Resource] {
			assert_eq!(
				InputKind::String.derivation_from(parent),
				Some(Derivation::Property)
			);
		}
	}

	#[test]
	fn default_replacement_key_wraps_name() {
		assert_eq!(replacement_key("scan-id", None), "#scan-id#");
		assert_eq!(replacement_key("scan-id", Some("#SCAN#")), "#SCAN#");
	}
}
