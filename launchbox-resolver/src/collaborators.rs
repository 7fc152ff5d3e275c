//! Seams to the surrounding platform. The resolver itself never talks to
//! a database, an archive filesystem, or a container runtime; everything
//! it needs from outside comes through these traits.

use std::path::{Path, PathBuf};

use launchbox_api::command::{Command, InputKind};

/// The caller on whose behalf resolution runs. Permission checks and
/// error messages use the username.
#[derive(Clone, Debug)]
pub struct UserContext {
	pub username: String,
}

impl UserContext {
	pub fn new(username: impl Into<String>) -> Self {
		UserContext { username: username.into() }
	}
}

/// A record fetched from the host data system, kept as serialized JSON so
/// derived inputs and matchers can be evaluated against it.
#[derive(Clone, Debug)]
pub struct HostObject {
	pub kind: InputKind,
	pub json: serde_json::Value,
}

impl HostObject {
	pub fn new(kind: InputKind, json: serde_json::Value) -> Self {
		HostObject { kind, json }
	}

	fn str_property(&self, name: &str) -> Option<&str> {
		self.json.get(name).and_then(|v| v.as_str())
	}

	pub fn uri(&self) -> Option<&str> {
		self.str_property("uri")
	}

	pub fn id(&self) -> Option<&str> {
		self.str_property("id")
	}

	pub fn label(&self) -> Option<&str> {
		self.str_property("label")
	}

	/// Path of the record's files on the archive filesystem, if it has
	/// any locally.
	pub fn directory(&self) -> Option<&str> {
		self.str_property("directory")
	}

	/// A scalar property rendered as a string. Objects and arrays yield
	/// `None`.
	pub fn scalar_property(&self, name: &str) -> Option<String> {
		match self.json.get(name)? {
			serde_json::Value::String(s) => Some(s.clone()),
			serde_json::Value::Number(n) => Some(n.to_string()),
			serde_json::Value::Bool(b) => Some(b.to_string()),
			_ => None,
		}
	}

	/// The string used as the resolved value of an input holding this
	/// record.
	pub fn reference(&self) -> String {
		self.uri()
			.or_else(|| self.id())
			.or_else(|| self.label())
			.unwrap_or_default()
			.to_owned()
	}
}

/// Looks up host-system records by the three reference forms callers may
/// use. `load_children` asks for the record's child collections to be
/// populated eagerly.
pub trait HostObjectResolver {
	fn by_uri(&self, kind: InputKind, uri: &str, load_children: bool) -> Option<HostObject>;
	fn by_id(&self, kind: InputKind, id: &str, load_children: bool) -> Option<HostObject>;
	fn from_json(&self, kind: InputKind, json: &str, load_children: bool) -> Option<HostObject>;
}

pub trait PermissionChecker {
	fn can_read(&self, user: &UserContext, object: &HostObject) -> bool;
	fn can_edit(&self, user: &UserContext, object: &HostObject) -> bool;
}

/// Prepares host directories for mounting into containers.
pub trait FilesystemStaging {
	/// A fresh, uniquely named directory under the build root.
	fn new_build_directory(&self) -> std::io::Result<PathBuf>;

	fn copy_directory(&self, from: &Path, to: &Path) -> std::io::Result<()>;

	/// Whether some of the record's files live in remote storage and
	/// must be pulled before they can be mounted.
	fn has_remote_files(&self, object: &HostObject) -> bool;

	fn pull_remote_files(&self, object: &HostObject, to: &Path) -> std::io::Result<()>;
}

/// Staging against a local build root: every build directory is a
/// fresh UUID-named directory under it, and all files are assumed local.
pub struct LocalStaging {
	build_root: PathBuf,
}

impl LocalStaging {
	pub fn new(build_root: impl Into<PathBuf>) -> Self {
		LocalStaging {
			build_root: build_root.into(),
		}
	}
}

impl FilesystemStaging for LocalStaging {
	fn new_build_directory(&self) -> std::io::Result<PathBuf> {
		let dir = self.build_root.join(uuid::Uuid::new_v4().to_string());
		std::fs::create_dir_all(&dir)?;
		Ok(dir)
	}

	fn copy_directory(&self, from: &Path, to: &Path) -> std::io::Result<()> {
		copy_tree(from, to)
	}

	fn has_remote_files(&self, _object: &HostObject) -> bool {
		false
	}

	fn pull_remote_files(&self, _object: &HostObject, _to: &Path) -> std::io::Result<()> {
		Ok(())
	}
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
	std::fs::create_dir_all(to)?;
	for entry in std::fs::read_dir(from)? {
		let entry = entry?;
		let target = to.join(entry.file_name());
		if entry.file_type()?.is_dir() {
			copy_tree(&entry.path(), &target)?;
		} else {
			std::fs::copy(entry.path(), &target)?;
		}
	}
	Ok(())
}

/// Prefix rewrite applied when the archive is mounted at a different
/// path inside the container host than on the data system.
#[derive(Clone, Debug)]
pub struct PathTranslation {
	pub host_prefix: String,
	pub container_host_prefix: String,
}

impl PathTranslation {
	pub fn translate(&self, path: &str) -> String {
		match path.strip_prefix(&self.host_prefix) {
			Some(rest) => format!("{}{}", self.container_host_prefix, rest),
			None => path.to_owned(),
		}
	}
}

/// One placement constraint declared in server configuration.
#[derive(Clone, Debug)]
pub struct PlacementConstraint {
	pub attribute: String,
	/// `==` or `!=`.
	pub comparator: String,
	pub values: Vec<String>,
	/// Whether the caller picks the value at launch time.
	pub user_settable: bool,
}

pub trait ServerConfiguration {
	fn path_translation(&self) -> Option<PathTranslation>;

	/// `None` when the server is not running against a cluster.
	fn placement_constraints(&self) -> Option<Vec<PlacementConstraint>>;
}

/// Finds the command declared for a setup or wrap-up image. `name`
/// narrows the lookup when several commands share the image.
pub trait SubcommandLookup {
	fn command_for_image(&self, image: &str, name: Option<&str>) -> Option<Command>;
}

/// All external seams bundled for passing through the resolution stages.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
	pub objects: &'a dyn HostObjectResolver,
	pub permissions: &'a dyn PermissionChecker,
	pub staging: &'a dyn FilesystemStaging,
	pub server: &'a dyn ServerConfiguration,
	pub subcommands: &'a dyn SubcommandLookup,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn path_translation_rewrites_prefix() {
		let translation = PathTranslation {
			host_prefix: "/data/archive".into(),
			container_host_prefix: "/docker/archive".into(),
		};
		assert_eq!(
			translation.translate("/data/archive/proj/scans"),
			"/docker/archive/proj/scans"
		);
		assert_eq!(translation.translate("/tmp/elsewhere"), "/tmp/elsewhere");
	}

	#[test]
	fn host_object_reference_prefers_uri() {
		let object = HostObject::new(
			InputKind::Scan,
			json!({"id": "2", "uri": "/data/sessions/1/scans/2"}),
		);
		assert_eq!(object.reference(), "/data/sessions/1/scans/2");

		let no_uri = HostObject::new(InputKind::Scan, json!({"id": "2"}));
		assert_eq!(no_uri.reference(), "2");
	}

	#[test]
	fn local_staging_creates_unique_directories_and_copies_trees() {
		let root = tempfile::tempdir().expect("tempdir");
		let staging = LocalStaging::new(root.path());

		let first = staging.new_build_directory().expect("build dir");
		let second = staging.new_build_directory().expect("build dir");
		assert_ne!(first, second);
		assert!(first.starts_with(root.path()));

		let source = root.path().join("source");
		std::fs::create_dir_all(source.join("nested")).expect("mkdir");
		std::fs::write(source.join("a.txt"), "a").expect("write");
		std::fs::write(source.join("nested/b.txt"), "b").expect("write");

		staging.copy_directory(&source, &first).expect("copy");
		assert_eq!(std::fs::read_to_string(first.join("a.txt")).expect("read"), "a");
		assert_eq!(
			std::fs::read_to_string(first.join("nested/b.txt")).expect("read"),
			"b"
		);
	}

	#[test]
	fn scalar_property_renders_numbers_and_bools() {
		let object = HostObject::new(
			InputKind::Scan,
			json!({"frames": 120, "quality": "usable", "shared": false, "note": null}),
		);
		assert_eq!(object.scalar_property("frames").as_deref(), Some("120"));
		assert_eq!(object.scalar_property("quality").as_deref(), Some("usable"));
		assert_eq!(object.scalar_property("shared").as_deref(), Some("false"));
		assert_eq!(object.scalar_property("note"), None);
		assert_eq!(object.scalar_property("absent"), None);
	}
}
