//! Template population: one embedded `^...^` reference pass, then one
//! literal substitution pass over the replacement map.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::query;

const WRAPPER_PREFIX: &str = "wrapper:";

/// Everything templates may reference: the resolved replacement map plus
/// the serialized command and wrapper for embedded queries.
pub struct TemplateContext<'a> {
	pub replacements: &'a IndexMap<String, String>,
	pub command_json: &'a Value,
	pub wrapper_json: &'a Value,
}

impl TemplateContext<'_> {
	pub fn resolve(&self, template: &str) -> Result<String> {
		let after_query = resolve_embedded_query(template, self.command_json, self.wrapper_json)?;
		Ok(substitute(&after_query, self.replacements))
	}

	pub fn resolve_optional(&self, template: Option<&str>) -> Result<Option<String>> {
		template.map(|t| self.resolve(t)).transpose()
	}
}

/// Replaces the template's embedded query, if it has one. The query spans
/// the first through the last `^` marker; a `wrapper:` prefix targets the
/// serialized wrapper instead of the command. Exactly one match replaces
/// the span; zero matches leave the template untouched.
fn resolve_embedded_query(template: &str, command: &Value, wrapper: &Value) -> Result<String> {
	let Some(first) = template.find('^') else {
		return Ok(template.to_owned());
	};
	let Some(last) = template.rfind('^') else {
		return Ok(template.to_owned());
	};
	if last <= first {
		return Ok(template.to_owned());
	}

	let body = &template[first + 1..last];
	let (query_text, root) = match body.strip_prefix(WRAPPER_PREFIX) {
		Some(rest) => (rest, wrapper),
		None => (body, command),
	};

	let matches = query::evaluate(root, query_text);
	match matches.as_slice() {
		[] => {
			debug!(query = query_text, "embedded reference matched nothing, leaving template as-is");
			Ok(template.to_owned())
		}
		[single] => Ok(format!(
			"{}{}{}",
			&template[..first],
			render(single),
			&template[last + 1..]
		)),
		many => Err(Error::AmbiguousReference {
			query: query_text.to_owned(),
			count: many.len(),
		}),
	}
}

fn render(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// Substitutes replacement keys in a single left-to-right pass. At each
/// position the longest matching key wins, and substituted text is never
/// rescanned, so replacement values containing other keys pass through
/// verbatim.
pub fn substitute(text: &str, replacements: &IndexMap<String, String>) -> String {
	let mut keys: Vec<&String> = replacements.keys().filter(|k| !k.is_empty()).collect();
	keys.sort_by(|a, b| b.len().cmp(&a.len()));

	let mut out = String::with_capacity(text.len());
	let mut pos = 0;
	while pos < text.len() {
		let rest = &text[pos..];
		match keys.iter().find(|key| rest.starts_with(key.as_str())) {
			Some(key) => {
				if let Some(value) = replacements.get(key.as_str()) {
					out.push_str(value);
				}
				pos += key.len();
			}
			None => {
				let step = rest.chars().next().map_or(1, char::len_utf8);
				out.push_str(&rest[..step]);
				pos += step;
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn replacements(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn substitution_is_single_pass() {
		let map = replacements(&[("#A#", "#B#"), ("#B#", "done")]);
		// The substituted "#B#" must not be rescanned.
		assert_eq!(substitute("#A# #B#", &map), "#B# done");
	}

	#[test]
	fn longest_key_wins_at_each_position() {
		let map = replacements(&[("#SCAN#", "short"), ("#SCAN-ID#", "long")]);
		assert_eq!(substitute("x #SCAN-ID# y", &map), "x long y");
	}

	#[test]
	fn unknown_text_passes_through() {
		let map = replacements(&[("#A#", "a")]);
		assert_eq!(substitute("#Z# stays", &map), "#Z# stays");
	}

	#[test]
	fn embedded_query_against_command() {
		let command = json!({"inputs": {"threshold": {"default-value": "0.5"}}});
		let wrapper = json!({});
		let out =
			resolve_embedded_query("t=^$.inputs.threshold.default-value^", &command, &wrapper)
				.unwrap();
		assert_eq!(out, "t=0.5");
	}

	#[test]
	fn embedded_query_against_wrapper() {
		let command = json!({});
		let wrapper = json!({"name": "segment-on-session"});
		let out = resolve_embedded_query("^wrapper:$.name^", &command, &wrapper).unwrap();
		assert_eq!(out, "segment-on-session");
	}

	#[test]
	fn zero_matches_leaves_template_untouched() {
		let command = json!({});
		let wrapper = json!({});
		let out = resolve_embedded_query("^$.absent^ tail", &command, &wrapper).unwrap();
		assert_eq!(out, "^$.absent^ tail");
	}

	#[test]
	fn multiple_matches_is_an_error() {
		let command = json!({"scans": [{"id": "1"}, {"id": "2"}]});
		let wrapper = json!({});
		let err = resolve_embedded_query("^$.scans[*].id^", &command, &wrapper).unwrap_err();
		assert!(matches!(err, Error::AmbiguousReference { count: 2, .. }));
	}

	#[test]
	fn lone_caret_is_not_a_query() {
		let command = json!({});
		let wrapper = json!({});
		let out = resolve_embedded_query("2^10", &command, &wrapper).unwrap();
		assert_eq!(out, "2^10");
	}
}
