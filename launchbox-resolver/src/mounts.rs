//! Mount resolution: deciding, per declared mount, which host directory
//! backs it, whether that directory must be staged, and whether a setup
//! command has to run first.

use launchbox_api::command::Command;
use launchbox_api::resolved::{ResolvedInputTree, ResolvedMount};
use std::path::Path;
use tracing::debug;

use crate::collaborators::{Collaborators, HostObject};
use crate::errors::{Error, Result};
use crate::template::TemplateContext;
use crate::tree;

/// A setup command to generate and run before the main container. The
/// staged content goes in read-only; the fresh output directory is what
/// the main container mounts.
pub struct SetupRequest {
	pub image: String,
	pub mount_name: String,
	pub input_host_path: String,
	pub input_container_host_path: String,
	pub output_host_path: String,
	pub output_container_host_path: String,
}

pub(crate) fn resolve_mounts(
	command: &Command,
	trees: &[ResolvedInputTree],
	templates: &TemplateContext,
	collaborators: &Collaborators,
) -> Result<(Vec<ResolvedMount>, Vec<SetupRequest>)> {
	let all_nodes = tree::walk(trees);
	let mut mounts = Vec::with_capacity(command.mounts.len());
	let mut setups = Vec::new();

	for mount in &command.mounts {
		let name = mount.name.0.as_str();
		let container_path = templates.resolve(&mount.path)?;
		let source = all_nodes
			.iter()
			.find(|node| node.source.provides_files_for_command_mount() == Some(name));

		let (mut host_path, mut writable, from_wrapper_input) = match source {
			None => {
				// An output mount: nothing feeds it, the container writes
				// into a fresh directory.
				let dir = new_build_directory(collaborators, name)?;
				(dir, true, None)
			}
			Some(node) => {
				let staged = stage_input_files(node, name, mount.writable, collaborators)?;
				(staged, mount.writable, Some(node.name.clone()))
			}
		};

		let via_setup = source.and_then(|node| node.source.via_setup_command());
		if let Some(image) = via_setup {
			// The staged path becomes the setup command's input; the
			// main container mounts the setup's output instead.
			let fresh = new_build_directory(collaborators, name)?;
			setups.push(SetupRequest {
				image: image.to_owned(),
				mount_name: name.to_owned(),
				input_host_path: host_path.clone(),
				input_container_host_path: translate(collaborators, &host_path),
				output_host_path: fresh.clone(),
				output_container_host_path: translate(collaborators, &fresh),
			});
			host_path = fresh;
			writable = mount.writable;
		}

		let container_host_path = translate(collaborators, &host_path);
		mounts.push(ResolvedMount {
			name: mount.name.clone(),
			writable,
			container_path,
			host_path,
			container_host_path,
			from_wrapper_input,
			via_setup_command: via_setup.map(str::to_owned),
		});
	}

	Ok((mounts, setups))
}

/// Decides the host directory for a mount fed by a wrapper input. Files
/// already on local disk are mounted directly when the container only
/// reads them; writable mounts and remote files get a staging copy.
fn stage_input_files(
	node: &ResolvedInputTree,
	mount_name: &str,
	writable: bool,
	collaborators: &Collaborators,
) -> Result<String> {
	let value = node.unique_value().ok_or_else(|| {
		Error::mount(
			mount_name,
			format!("input \"{}\" did not resolve to exactly one value", node.name),
		)
	})?;

	let (directory, remote) = match &value.object {
		Some(object) => {
			let host_object = HostObject::new(object.kind, object.json.clone());
			(
				host_object.directory().map(str::to_owned),
				collaborators.staging.has_remote_files(&host_object),
			)
		}
		// A plain value feeding a mount is taken as a directory path.
		None => (
			value.value.clone().filter(|v| !v.is_empty()),
			false,
		),
	};

	if directory.is_none() && !remote {
		return Err(Error::mount(
			mount_name,
			format!("input \"{}\" has no files to mount", node.name),
		));
	}

	match (&directory, writable || remote) {
		(Some(dir), false) => {
			debug!(mount = mount_name, directory = dir.as_str(), "mounting archive directory directly");
			Ok(dir.clone())
		}
		_ => {
			let staging_dir = new_build_directory(collaborators, mount_name)?;
			if let Some(dir) = &directory {
				collaborators
					.staging
					.copy_directory(Path::new(dir), Path::new(&staging_dir))
					.map_err(|cause| {
						Error::staging(format!("copying files for mount \"{mount_name}\""), cause)
					})?;
			}
			if remote {
				if let Some(object) = &value.object {
					let host_object = HostObject::new(object.kind, object.json.clone());
					collaborators
						.staging
						.pull_remote_files(&host_object, Path::new(&staging_dir))
						.map_err(|cause| {
							Error::staging(
								format!("pulling remote files for mount \"{mount_name}\""),
								cause,
							)
						})?;
				}
			}
			Ok(staging_dir)
		}
	}
}

pub(crate) fn new_build_directory(collaborators: &Collaborators, purpose: &str) -> Result<String> {
	let dir = collaborators
		.staging
		.new_build_directory()
		.map_err(|cause| Error::staging(format!("creating build directory for \"{purpose}\""), cause))?;
	Ok(dir.to_string_lossy().into_owned())
}

pub(crate) fn translate(collaborators: &Collaborators, path: &str) -> String {
	match collaborators.server.path_translation() {
		Some(translation) => translation.translate(path),
		None => path.to_owned(),
	}
}
