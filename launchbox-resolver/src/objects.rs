//! Turning caller-supplied value strings into host-system records, and
//! hygiene checks on raw values.

use launchbox_api::command::InputKind;
use launchbox_api::resolved::{ResolvedObject, ResolvedValue};
use tracing::debug;

use crate::collaborators::{Collaborators, HostObject, UserContext};
use crate::errors::{Error, Result};
use crate::query;

/// Character sequences never accepted in caller-supplied values; they
/// have no legitimate use in ids, URIs, or parameter values, and would
/// otherwise flow into a shell-interpreted command line.
const ILLEGAL_FRAGMENTS: &[&str] = &["..", ";", "`", "&&", "||", "$("];

pub fn check_value_hygiene(input: &str, value: &str) -> Result<()> {
	for fragment in ILLEGAL_FRAGMENTS {
		if value.contains(fragment) {
			return Err(Error::IllegalInputValue {
				input: input.to_owned(),
				fragment: (*fragment).to_owned(),
			});
		}
	}
	Ok(())
}

/// Resolves a reference string to a host object: a leading `/` means a
/// URI, a leading `{` inline JSON, anything else an id. `Ok(None)` means
/// the reference found nothing; whether that is fatal is the caller's
/// call. A found record the user cannot read is always fatal.
pub fn resolve_reference(
	collaborators: &Collaborators,
	user: &UserContext,
	kind: InputKind,
	reference: &str,
	load_children: bool,
) -> Result<Option<HostObject>> {
	let reference = reference.trim();
	if reference.is_empty() {
		return Ok(None);
	}

	let found = if reference.starts_with('/') {
		collaborators.objects.by_uri(kind, reference, load_children)
	} else if reference.starts_with('{') {
		collaborators.objects.from_json(kind, reference, load_children)
	} else {
		collaborators.objects.by_id(kind, reference, load_children)
	};

	let Some(object) = found else {
		debug!(kind = kind.name(), reference, "reference matched no record");
		return Ok(None);
	};
	require_readable(collaborators, user, &object)?;
	Ok(Some(object))
}

pub fn require_readable(
	collaborators: &Collaborators,
	user: &UserContext,
	object: &HostObject,
) -> Result<()> {
	if collaborators.permissions.can_read(user, object) {
		Ok(())
	} else {
		Err(Error::Unauthorized {
			user: user.username.clone(),
			action: "read",
			object: describe(object),
		})
	}
}

pub fn describe(object: &HostObject) -> String {
	let reference = object.reference();
	if reference.is_empty() {
		format!("a {} record", object.kind.name())
	} else {
		format!("{} {}", object.kind.name(), reference)
	}
}

/// The resolved value carried for an input holding this record: the
/// reference string as the value, the record's label, and the serialized
/// record for derivation.
pub fn to_resolved_value(object: &HostObject) -> ResolvedValue {
	ResolvedValue {
		value: Some(object.reference()),
		label: object.label().map(str::to_owned).or_else(|| {
			let r = object.reference();
			(!r.is_empty()).then_some(r)
		}),
		object: Some(ResolvedObject {
			kind: object.kind,
			uri: object.reference(),
			label: object.label().map(str::to_owned),
			json: object.json.clone(),
		}),
	}
}

/// Builds the filter selecting children that match a caller-supplied
/// value. A JSON array value becomes an `in` clause; a plain value an
/// equality clause. The declared matcher, when present, is kept as an
/// extra conjunct.
pub fn child_filter(property: &str, value: Option<&str>, declared: Option<&str>) -> Option<String> {
	let value_clause = value.and_then(|v| {
		let v = v.trim();
		if v.is_empty() {
			return None;
		}
		if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(v) {
			let rendered: Vec<String> = items
				.iter()
				.map(|item| match item {
					serde_json::Value::String(s) => format!("'{s}'"),
					other => other.to_string(),
				})
				.collect();
			Some(format!("@.{property} in [{}]", rendered.join(", ")))
		} else {
			Some(format!("@.{property} == '{v}'"))
		}
	});

	match (value_clause, declared) {
		(Some(from_value), Some(declared)) if !declared.trim().is_empty() => {
			Some(format!("{from_value} && {declared}"))
		}
		(Some(from_value), _) => Some(from_value),
		(None, Some(declared)) if !declared.trim().is_empty() => Some(declared.to_owned()),
		(None, _) => None,
	}
}

/// Applies an optional filter to a candidate record's JSON.
pub fn passes_filter(json: &serde_json::Value, filter: Option<&str>) -> bool {
	match filter {
		Some(filter) if !filter.trim().is_empty() => query::filter_matches(json, filter),
		_ => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn hygiene_rejects_shell_metacharacters() {
		assert!(check_value_hygiene("t", "plain-value_1.2").is_ok());
		assert!(check_value_hygiene("t", "/data/sessions/1").is_ok());
		for bad in ["../etc", "a;b", "x`y`", "a && b", "a || b", "$(cat)"] {
			let err = check_value_hygiene("t", bad).unwrap_err();
			assert!(matches!(err, Error::IllegalInputValue { .. }), "{bad}");
		}
	}

	#[test]
	fn child_filter_forms() {
		assert_eq!(
			child_filter("id", Some("2"), None).as_deref(),
			Some("@.id == '2'")
		);
		assert_eq!(
			child_filter("id", Some(r#"["1", "3"]"#), None).as_deref(),
			Some("@.id in ['1', '3']")
		);
		assert_eq!(
			child_filter("id", Some("2"), Some("@.quality == 'usable'")).as_deref(),
			Some("@.id == '2' && @.quality == 'usable'")
		);
		assert_eq!(
			child_filter("id", None, Some("@.quality == 'usable'")).as_deref(),
			Some("@.quality == 'usable'")
		);
		assert_eq!(child_filter("id", None, None), None);
	}

	#[test]
	fn synthesized_filter_matches_candidates() {
		let scan = json!({"id": "2", "quality": "usable"});
		let filter = child_filter("id", Some("2"), Some("@.quality == 'usable'")).unwrap();
		assert!(passes_filter(&scan, Some(&filter)));

		let other = json!({"id": "2", "quality": "questionable"});
		assert!(!passes_filter(&other, Some(&filter)));
	}
}
