//! Placement constraint resolution for clustered container backends.

use indexmap::IndexMap;
use tracing::warn;

use crate::collaborators::ServerConfiguration;

/// Renders the server's placement constraints against the caller's
/// selections. `None` means the server declares none (or is not in
/// cluster mode); an empty render also collapses to `None`.
pub fn resolve_placement_constraints(
	server: &dyn ServerConfiguration,
	selections: &IndexMap<String, String>,
) -> Option<Vec<String>> {
	let declared = server.placement_constraints()?;

	let mut rendered = Vec::new();
	for constraint in &declared {
		if !constraint.user_settable {
			match constraint.values.first() {
				Some(value) => {
					rendered.push(format!(
						"{}{}{}",
						constraint.attribute, constraint.comparator, value
					));
				}
				None => {
					warn!(
						attribute = constraint.attribute,
						"placement constraint declares no values, skipping"
					);
				}
			}
			continue;
		}

		// A settable constraint only applies when the caller picked one
		// of its declared values.
		let Some(selection) = selections.get(&constraint.attribute) else {
			continue;
		};
		if selection.trim().is_empty() {
			continue;
		}
		if !constraint.values.contains(selection) {
			warn!(
				attribute = constraint.attribute,
				selection, "selection is not among the declared values, skipping"
			);
			continue;
		}
		rendered.push(format!(
			"{}{}{}",
			constraint.attribute, constraint.comparator, selection
		));
	}

	if rendered.is_empty() {
		None
	} else {
		Some(rendered)
	}
}
