//! Input tree construction, depth-first resolution, and the flattening
//! of resolved trees into template replacement maps.

use indexmap::IndexMap;
use launchbox_api::command::{
	Command, CommandInput, Derivation, InputKind, MultipleDelimiter,
};
use launchbox_api::resolved::{InputSource, ResolvedInputTree, ResolvedValue, ValueAndChildren};
use launchbox_api::wrapper::Wrapper;
use serde_json::Value;
use tracing::{debug, warn};

use crate::collaborators::{Collaborators, HostObject, UserContext};
use crate::errors::{Error, Result};
use crate::objects;
use crate::query;

/// The pre-resolution forest: external inputs as roots, derived inputs
/// under their declared parents, command inputs under the wrapper input
/// that feeds them or as roots of their own.
#[derive(Debug)]
pub struct InputForest {
	nodes: Vec<Node>,
	roots: Vec<usize>,
	seeded_command_line: IndexMap<String, String>,
	detail_kinds: Vec<InputKind>,
}

#[derive(Debug)]
struct Node {
	name: String,
	source: InputSource,
	children: Vec<usize>,
}

pub(crate) struct ResolveCtx<'a> {
	pub collaborators: &'a Collaborators<'a>,
	pub user: &'a UserContext,
	pub runtime: &'a IndexMap<String, String>,
	pub command_json: &'a Value,
	pub wrapper_json: &'a Value,
}

impl ResolveCtx<'_> {
	/// Caller-supplied and default values are themselves templates: they
	/// may carry an embedded query and reference keys bound earlier on
	/// this branch.
	fn resolve_text(&self, text: &str, bound: &IndexMap<String, String>) -> Result<String> {
		crate::template::TemplateContext {
			replacements: bound,
			command_json: self.command_json,
			wrapper_json: self.wrapper_json,
		}
		.resolve(text)
	}
}

/// Host-object kinds whose records must be loaded with child collections
/// populated, because some derived input matches children under them.
/// Computed once per resolution from the declarations alone.
pub fn kinds_requiring_detail(wrapper: &Wrapper) -> Vec<InputKind> {
	let mut kinds = Vec::new();
	for input in wrapper.derived_inputs.values() {
		let parent = input.derived_from_wrapper_input.as_str();
		let parent_kind = wrapper
			.external_inputs
			.get(parent)
			.map(|e| e.kind)
			.or_else(|| wrapper.derived_inputs.get(parent).map(|d| d.kind));
		let Some(parent_kind) = parent_kind else {
			continue;
		};
		if matches!(
			input.kind.derivation_from(parent_kind),
			Some(Derivation::MatchChildren { .. })
		) && !kinds.contains(&parent_kind)
		{
			kinds.push(parent_kind);
		}
	}
	kinds
}

impl InputForest {
	pub fn build(command: &Command, wrapper: &Wrapper) -> Result<InputForest> {
		let mut forest = InputForest {
			nodes: Vec::new(),
			roots: Vec::new(),
			seeded_command_line: IndexMap::new(),
			detail_kinds: kinds_requiring_detail(wrapper),
		};
		let mut wrapper_inputs: IndexMap<&str, usize> = IndexMap::new();

		for (name, input) in &wrapper.external_inputs {
			if wrapper_inputs.contains_key(name.as_str()) {
				return Err(Error::tree(format!("duplicate input name \"{name}\"")));
			}
			let idx = forest.push(name, InputSource::External(input.clone()));
			forest.roots.push(idx);
			wrapper_inputs.insert(name, idx);
		}

		for (name, input) in &wrapper.derived_inputs {
			if wrapper_inputs.contains_key(name.as_str()) {
				return Err(Error::tree(format!("duplicate input name \"{name}\"")));
			}
			let parent = *wrapper_inputs
				.get(input.derived_from_wrapper_input.as_str())
				.ok_or_else(|| {
					Error::tree(format!(
						"derived input \"{name}\" names parent \"{}\" which is not declared before it",
						input.derived_from_wrapper_input
					))
				})?;
			let idx = forest.push(name, InputSource::Derived(input.clone()));
			forest.nodes[parent].children.push(idx);
			wrapper_inputs.insert(name, idx);
		}

		for (name, input) in &command.inputs {
			let feeder = wrapper_inputs
				.values()
				.find(|&&idx| {
					forest.nodes[idx].source.provides_value_for_command_input() == Some(name)
				})
				.copied();
			let source = InputSource::Command(input.clone());
			match feeder {
				Some(parent) => {
					// An optional feeder may resolve to nothing; its fed
					// input then substitutes to empty rather than leaving
					// the placeholder in the command line.
					if !forest.nodes[parent].source.required() {
						forest
							.seeded_command_line
							.insert(source.replacement_key(name), String::new());
					}
					let idx = forest.push(name, source);
					forest.nodes[parent].children.push(idx);
				}
				None => {
					let idx = forest.push(name, source);
					forest.roots.push(idx);
				}
			}
		}

		Ok(forest)
	}

	fn push(&mut self, name: &str, source: InputSource) -> usize {
		self.nodes.push(Node {
			name: name.to_owned(),
			source,
			children: Vec::new(),
		});
		self.nodes.len() - 1
	}

	/// Command-line substitutions that apply before any value resolves.
	pub fn seeded_command_line(&self) -> &IndexMap<String, String> {
		&self.seeded_command_line
	}

	pub(crate) fn resolve(&self, ctx: &ResolveCtx) -> Result<Vec<ResolvedInputTree>> {
		let mut trees = Vec::with_capacity(self.roots.len());
		let mut bound: IndexMap<String, String> = IndexMap::new();
		for &idx in &self.roots {
			let tree = self.resolve_node(idx, None, &bound, ctx)?;
			// Later roots may reference this one's key in their own
			// value templates, but only when it resolved uniquely.
			if let Some(value) = tree.unique_value() {
				bound.insert(
					tree.source.replacement_key(&tree.name),
					value.value.clone().unwrap_or_default(),
				);
			}
			trees.push(tree);
		}
		Ok(trees)
	}

	fn resolve_node(
		&self,
		idx: usize,
		parent_value: Option<&ResolvedValue>,
		bound: &IndexMap<String, String>,
		ctx: &ResolveCtx,
	) -> Result<ResolvedInputTree> {
		let node = &self.nodes[idx];
		let values = match &node.source {
			InputSource::External(_) => self.resolve_external(node, bound, ctx)?,
			InputSource::Derived(_) => self.resolve_derived(node, parent_value, bound, ctx)?,
			InputSource::Command(_) => resolve_command_input(node, parent_value, bound, ctx)?,
		};

		// Values pulled from host records go through the same screen as
		// caller-supplied ones; nothing reaches a template unchecked.
		for value in &values {
			if let Some(text) = value.value.as_deref() {
				objects::check_value_hygiene(&node.name, text)?;
			}
		}

		// Each value fans out into its own child branch, with its own
		// copy of the bound-key map so branches cannot leak into each
		// other.
		let mut branches = Vec::with_capacity(values.len());
		for value in values {
			let mut branch_bound = bound.clone();
			branch_bound.insert(
				node.source.replacement_key(&node.name),
				value.value.clone().unwrap_or_default(),
			);
			let children = node
				.children
				.iter()
				.map(|&child| self.resolve_node(child, Some(&value), &branch_bound, ctx))
				.collect::<Result<Vec<_>>>()?;
			branches.push(ValueAndChildren { value, children });
		}

		Ok(ResolvedInputTree {
			name: node.name.clone(),
			source: node.source.clone(),
			values: branches,
		})
	}

	fn load_children(&self, source: &InputSource) -> bool {
		source.load_children() || self.detail_kinds.contains(&source.kind())
	}
}

fn runtime_value<'a>(node: &Node, ctx: &'a ResolveCtx) -> Result<Option<&'a str>> {
	match ctx.runtime.get(&node.name) {
		Some(value) => {
			objects::check_value_hygiene(&node.name, value)?;
			Ok(Some(value.as_str()))
		}
		None => Ok(None),
	}
}

impl InputForest {
	fn resolve_external(
		&self,
		node: &Node,
		bound: &IndexMap<String, String>,
		ctx: &ResolveCtx,
	) -> Result<Vec<ResolvedValue>> {
		let provided = runtime_value(node, ctx)?;
		let text = match provided.or(node.source.default_value()) {
			Some(text) => Some(ctx.resolve_text(text, bound)?),
			None => None,
		};
		let kind = node.source.kind();

		if !kind.is_root_object() {
			return Ok(match text {
				Some(text) if !text.is_empty() => vec![ResolvedValue::literal(text)],
				_ => vec![],
			});
		}

		let Some(reference) = text else {
			return Ok(vec![]);
		};
		let found = objects::resolve_reference(
			ctx.collaborators,
			ctx.user,
			kind,
			&reference,
			self.load_children(&node.source),
		)?;
		let Some(object) = found else {
			return Ok(vec![]);
		};
		if !objects::passes_filter(&object.json, node.source.matcher()) {
			debug!(input = node.name, "record rejected by matcher");
			return Ok(vec![]);
		}
		Ok(vec![objects::to_resolved_value(&object)])
	}

	fn resolve_derived(
		&self,
		node: &Node,
		parent_value: Option<&ResolvedValue>,
		bound: &IndexMap<String, String>,
		ctx: &ResolveCtx,
	) -> Result<Vec<ResolvedValue>> {
		let provided = runtime_value(node, ctx)?;
		let provided = match provided {
			Some(text) => Some(ctx.resolve_text(text, bound)?),
			None => None,
		};
		let provided = provided.as_deref();
		let InputSource::Derived(input) = &node.source else {
			return Err(Error::tree(format!("input \"{}\" is not derived", node.name)));
		};

		let Some(parent_object) = parent_value.and_then(|v| v.object.as_ref()) else {
			debug!(input = node.name, "parent value holds no record, nothing to derive");
			return Ok(vec![]);
		};
		let Some(derivation) = input.kind.derivation_from(parent_object.kind) else {
			warn!(
				input = node.name,
				child = input.kind.name(),
				parent = parent_object.kind.name(),
				"unsupported derivation pairing, yields no values"
			);
			return Ok(vec![]);
		};

		match derivation {
			Derivation::Property => {
				let Some(property) = input.derived_from_property.as_deref() else {
					warn!(input = node.name, "property derivation without derived-from-property");
					return Ok(vec![]);
				};
				let pulled = scalar_of(&parent_object.json, property);
				Ok(literal_if_selected(pulled, provided))
			}
			Derivation::DirectoryProperty => {
				let pulled = scalar_of(&parent_object.json, "directory");
				Ok(literal_if_selected(pulled, provided))
			}
			Derivation::MatchChildren {
				collection,
				match_properties,
			} => {
				let candidates = match parent_object.json.get(collection).and_then(Value::as_array)
				{
					Some(items) => items,
					None => {
						debug!(
							input = node.name,
							collection, "parent record has no child collection"
						);
						return Ok(vec![]);
					}
				};

				let selector = provided.or(input.default_value.as_deref());
				let matched =
					match_candidates(candidates, selector, input.matcher.as_deref(), match_properties);

				let mut values = Vec::with_capacity(matched.len());
				for candidate in matched {
					let mut object = HostObject::new(input.kind, candidate.clone());
					if self.load_children(&node.source) {
						if let Some(uri) = object.uri() {
							if let Some(loaded) =
								ctx.collaborators.objects.by_uri(input.kind, uri, true)
							{
								object = loaded;
							}
						}
					}
					values.push(objects::to_resolved_value(&object));
				}
				Ok(values)
			}
			Derivation::ParentReference { property } => {
				let Some(reference) = parent_object.json.get(property).and_then(Value::as_str)
				else {
					debug!(input = node.name, property, "parent record carries no reference");
					return Ok(vec![]);
				};
				let found = objects::resolve_reference(
					ctx.collaborators,
					ctx.user,
					input.kind,
					reference,
					self.load_children(&node.source),
				)?;
				let Some(object) = found else {
					return Ok(vec![]);
				};
				if !objects::passes_filter(&object.json, input.matcher.as_deref()) {
					return Ok(vec![]);
				}
				Ok(vec![objects::to_resolved_value(&object)])
			}
		}
	}
}

/// Candidates matching the selector value, trying each match property in
/// order until one yields anything. Without a selector only the declared
/// matcher applies.
fn match_candidates<'v>(
	candidates: &'v [Value],
	selector: Option<&str>,
	declared: Option<&str>,
	match_properties: &[&str],
) -> Vec<&'v Value> {
	let has_selector = selector.is_some_and(|s| !s.trim().is_empty());
	if !has_selector {
		return candidates
			.iter()
			.filter(|c| objects::passes_filter(c, declared))
			.collect();
	}
	for property in match_properties {
		let filter = objects::child_filter(property, selector, declared);
		let matched: Vec<&Value> = candidates
			.iter()
			.filter(|c| objects::passes_filter(c, filter.as_deref()))
			.collect();
		if !matched.is_empty() {
			return matched;
		}
	}
	Vec::new()
}

fn scalar_of(json: &Value, property: &str) -> Option<String> {
	match json.get(property)? {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

/// A pulled scalar survives only when the caller either supplied nothing
/// or supplied exactly it.
fn literal_if_selected(pulled: Option<String>, provided: Option<&str>) -> Vec<ResolvedValue> {
	match pulled {
		Some(value) if !value.is_empty() => match provided {
			Some(p) if p != value => vec![],
			_ => vec![ResolvedValue::literal(value)],
		},
		_ => vec![],
	}
}

fn resolve_command_input(
	node: &Node,
	parent_value: Option<&ResolvedValue>,
	bound: &IndexMap<String, String>,
	ctx: &ResolveCtx,
) -> Result<Vec<ResolvedValue>> {
	let provided = runtime_value(node, ctx)?;
	let InputSource::Command(input) = &node.source else {
		return Err(Error::tree(format!("input \"{}\" is not a command input", node.name)));
	};

	// A feeding wrapper input overrides anything supplied directly. Its
	// pushed value is already concrete; the other sources are templates.
	let pushed = parent_value.and_then(|v| v.value.as_deref());
	let text = match pushed {
		Some(pushed) => Some(pushed.to_owned()),
		None => match provided.or(input.default_value.as_deref()) {
			Some(text) => Some(ctx.resolve_text(text, bound)?),
			None => None,
		},
	};
	let Some(text) = text else {
		return Ok(vec![]);
	};
	if text.is_empty() {
		return Ok(vec![]);
	}
	let text = text.as_str();

	if let Some(matcher) = input.matcher.as_deref().filter(|m| !m.trim().is_empty()) {
		if let Ok(json) = serde_json::from_str::<Value>(text) {
			if !query::filter_matches(&json, matcher) {
				debug!(input = node.name, "value rejected by matcher");
				return Ok(vec![]);
			}
		}
	}

	Ok(vec![ResolvedValue::literal(text)])
}

/// Replacement maps produced by flattening resolved trees: one for
/// generic templates, one carrying command-line renderings (flags,
/// separators, boolean mappings, list joins).
#[derive(Debug, Default)]
pub struct FlattenedValues {
	pub replacements: IndexMap<String, String>,
	pub command_line: IndexMap<String, String>,
}

/// Collapses the resolved trees into replacement maps. In strict mode a
/// node with several values fails with [`Error::AmbiguousValue`] unless
/// the multiple-value aggregation rule applies; a preview skips the
/// binding instead.
pub fn flatten(trees: &[ResolvedInputTree], strict: bool) -> Result<FlattenedValues> {
	let mut out = FlattenedValues::default();
	for tree in trees {
		flatten_tree(tree, strict, &mut out)?;
	}
	Ok(out)
}

fn flatten_tree(tree: &ResolvedInputTree, strict: bool, out: &mut FlattenedValues) -> Result<()> {
	match tree.values.as_slice() {
		// Nothing resolved; the missing-required scan decides whether
		// that is fatal.
		[] => Ok(()),
		[single] => {
			let key = tree.source.replacement_key(&tree.name);
			let value = single.value.value.clone().unwrap_or_default();
			if let InputSource::Command(input) = &tree.source {
				out.command_line
					.insert(key.clone(), command_line_value(input, &value));
			}
			out.replacements.insert(key, value);
			for child in &single.children {
				flatten_tree(child, strict, out)?;
			}
			Ok(())
		}
		_ => {
			if tree.source.multiple() {
				if let Some(aggregated) = aggregate(tree) {
					let list = format!("[{}]", aggregated.values.join(", "));
					out.replacements
						.insert(tree.source.replacement_key(&tree.name), list.clone());
					out.replacements.insert(aggregated.key.clone(), list);
					out.command_line.insert(
						aggregated.key,
						join_for_command_line(&aggregated.input, &aggregated.values),
					);
					return Ok(());
				}
			}
			if strict {
				Err(Error::AmbiguousValue {
					input: tree.name.clone(),
				})
			} else {
				Ok(())
			}
		}
	}
}

struct Aggregated {
	input: CommandInput,
	key: String,
	values: Vec<String>,
}

/// The one legal shape for a multi-valued node: a derived input feeding
/// a command input, where every branch carries exactly that one command
/// input with at most one value. Blank branch values are skipped.
fn aggregate(tree: &ResolvedInputTree) -> Option<Aggregated> {
	let target = tree.source.provides_value_for_command_input()?;
	let mut found: Option<(CommandInput, String)> = None;
	let mut values = Vec::new();

	for branch in &tree.values {
		let child = branch
			.children
			.iter()
			.find(|c| c.name == target && matches!(c.source, InputSource::Command(_)))?;
		let InputSource::Command(input) = &child.source else {
			return None;
		};
		match child.values.as_slice() {
			[] => {}
			[single] => {
				if let Some(value) = single.value.value.as_deref() {
					if !value.is_empty() {
						values.push(value.to_owned());
					}
				}
			}
			_ => return None,
		}
		found = Some((input.clone(), child.source.replacement_key(&child.name)));
	}

	found.map(|(input, key)| Aggregated { input, key, values })
}

/// Renders one value the way it appears on the command line.
fn command_line_value(input: &CommandInput, value: &str) -> String {
	let mapped: String = if input.kind == InputKind::Boolean {
		match value.parse::<bool>() {
			Ok(true) => input.true_value.clone().unwrap_or_else(|| value.to_owned()),
			Ok(false) => input.false_value.clone().unwrap_or_else(|| value.to_owned()),
			Err(_) => value.to_owned(),
		}
	} else {
		value.to_owned()
	};

	if input.multi_select {
		if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&mapped) {
			let rendered: Vec<String> = items
				.iter()
				.map(|item| match item {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				})
				.collect();
			return join_for_command_line(input, &rendered);
		}
	}

	if mapped.is_empty() {
		return mapped;
	}
	match input.command_line_flag.as_deref() {
		Some(flag) if !flag.is_empty() => {
			let separator = input.command_line_separator.as_deref().unwrap_or(" ");
			format!("{flag}{separator}{mapped}")
		}
		_ => mapped,
	}
}

/// Joins several values into one command-line substitution per the
/// input's delimiter.
fn join_for_command_line(input: &CommandInput, values: &[String]) -> String {
	if values.is_empty() {
		return String::new();
	}
	let flag = input
		.command_line_flag
		.as_deref()
		.filter(|f| !f.is_empty());
	let separator = input.command_line_separator.as_deref().unwrap_or(" ");
	let prefix = flag
		.map(|f| format!("{f}{separator}"))
		.unwrap_or_default();

	match input.multiple_delimiter {
		MultipleDelimiter::Space => format!("{prefix}{}", values.join(" ")),
		MultipleDelimiter::Comma => format!("{prefix}{}", values.join(",")),
		MultipleDelimiter::QuotedSpace => {
			format!("{prefix}'{}'", values.join("' '"))
		}
		MultipleDelimiter::Flag => values
			.iter()
			.map(|v| format!("{prefix}{v}"))
			.collect::<Vec<_>>()
			.join(" "),
	}
}

/// Required inputs that resolved to no non-blank value anywhere.
pub fn missing_required_inputs(trees: &[ResolvedInputTree]) -> Vec<String> {
	let mut missing = Vec::new();
	for tree in trees {
		scan_missing(tree, &mut missing);
	}
	missing
}

fn scan_missing(tree: &ResolvedInputTree, missing: &mut Vec<String>) {
	let has_value = tree
		.values
		.iter()
		.any(|branch| branch.value.value.as_deref().is_some_and(|v| !v.is_empty()));
	if tree.source.required() && !has_value {
		missing.push(tree.name.clone());
	}
	for branch in &tree.values {
		for child in &branch.children {
			scan_missing(child, missing);
		}
	}
}

/// All nodes of all trees in depth-first order.
pub fn walk(trees: &[ResolvedInputTree]) -> Vec<&ResolvedInputTree> {
	fn push<'t>(tree: &'t ResolvedInputTree, out: &mut Vec<&'t ResolvedInputTree>) {
		out.push(tree);
		for branch in &tree.values {
			for child in &branch.children {
				push(child, out);
			}
		}
	}
	let mut out = Vec::new();
	for tree in trees {
		push(tree, &mut out);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use launchbox_api::wrapper::{DerivedInput, ExternalInput};

	fn command_input(flag: Option<&str>) -> CommandInput {
		CommandInput {
			command_line_flag: flag.map(str::to_owned),
			..Default::default()
		}
	}

	fn literal_tree(name: &str, source: InputSource, values: &[&str]) -> ResolvedInputTree {
		ResolvedInputTree {
			name: name.to_owned(),
			source,
			values: values
				.iter()
				.map(|v| ValueAndChildren {
					value: ResolvedValue::literal(*v),
					children: vec![],
				})
				.collect(),
		}
	}

	#[test]
	fn build_rejects_undeclared_parent() {
		let command = Command {
			name: "c".into(),
			label: None,
			description: None,
			image: "i".into(),
			kind: Default::default(),
			command_line: None,
			override_entrypoint: false,
			working_directory: None,
			environment_variables: IndexMap::new(),
			ports: IndexMap::new(),
			inputs: IndexMap::new(),
			outputs: vec![],
			mounts: vec![],
			reserve_memory: None,
			limit_memory: None,
			limit_cpu: None,
			shm_size: None,
			generic_resources: IndexMap::new(),
		};
		let mut wrapper = Wrapper {
			name: "w".into(),
			label: None,
			description: None,
			external_inputs: IndexMap::new(),
			derived_inputs: IndexMap::new(),
			output_handlers: IndexMap::new(),
		};
		wrapper.derived_inputs.insert(
			"scan".into(),
			DerivedInput {
				derived_from_wrapper_input: "session".into(),
				..Default::default()
			},
		);

		let err = InputForest::build(&command, &wrapper).unwrap_err();
		assert!(matches!(err, Error::TreeConstruction { .. }));
		assert!(err.to_string().contains("session"));
	}

	#[test]
	fn build_seeds_empty_substitution_for_optionally_fed_input() {
		let mut command = Command {
			name: "c".into(),
			label: None,
			description: None,
			image: "i".into(),
			kind: Default::default(),
			command_line: None,
			override_entrypoint: false,
			working_directory: None,
			environment_variables: IndexMap::new(),
			ports: IndexMap::new(),
			inputs: IndexMap::new(),
			outputs: vec![],
			mounts: vec![],
			reserve_memory: None,
			limit_memory: None,
			limit_cpu: None,
			shm_size: None,
			generic_resources: IndexMap::new(),
		};
		command
			.inputs
			.insert("other-options".into(), CommandInput::default());
		let mut wrapper = Wrapper {
			name: "w".into(),
			label: None,
			description: None,
			external_inputs: IndexMap::new(),
			derived_inputs: IndexMap::new(),
			output_handlers: IndexMap::new(),
		};
		wrapper.external_inputs.insert(
			"options".into(),
			ExternalInput {
				required: false,
				provides_value_for_command_input: Some("other-options".into()),
				..Default::default()
			},
		);

		let forest = InputForest::build(&command, &wrapper).unwrap();
		assert_eq!(
			forest.seeded_command_line().get("#other-options#"),
			Some(&String::new())
		);
	}

	#[test]
	fn flatten_binds_value_and_command_line() {
		let tree = literal_tree(
			"threshold",
			InputSource::Command(command_input(Some("--threshold"))),
			&["0.5"],
		);
		let out = flatten(&[tree], true).unwrap();
		assert_eq!(out.replacements.get("#threshold#"), Some(&"0.5".to_string()));
		assert_eq!(
			out.command_line.get("#threshold#"),
			Some(&"--threshold 0.5".to_string())
		);
	}

	#[test]
	fn flatten_rejects_ambiguity_in_strict_mode_only() {
		let strict_tree = literal_tree(
			"scan",
			InputSource::Derived(DerivedInput {
				derived_from_wrapper_input: "session".into(),
				..Default::default()
			}),
			&["/s/1", "/s/2"],
		);
		let err = flatten(std::slice::from_ref(&strict_tree), true).unwrap_err();
		assert!(matches!(err, Error::AmbiguousValue { .. }));

		let out = flatten(&[strict_tree], false).unwrap();
		assert!(out.replacements.is_empty());
	}

	#[test]
	fn flatten_aggregates_multiple_derived_through_command_input() {
		let ci = command_input(Some("--scan"));
		let mut tree = literal_tree(
			"scans",
			InputSource::Derived(DerivedInput {
				derived_from_wrapper_input: "session".into(),
				multiple: true,
				provides_value_for_command_input: Some("scan-id".into()),
				..Default::default()
			}),
			&["/s/1", "/s/2"],
		);
		for (branch, id) in tree.values.iter_mut().zip(["1", "2"]) {
			branch.children.push(literal_tree(
				"scan-id",
				InputSource::Command(ci.clone()),
				&[id],
			));
		}

		let out = flatten(&[tree], true).unwrap();
		assert_eq!(out.replacements.get("#scans#"), Some(&"[1, 2]".to_string()));
		assert_eq!(out.replacements.get("#scan-id#"), Some(&"[1, 2]".to_string()));
		assert_eq!(
			out.command_line.get("#scan-id#"),
			Some(&"--scan 1 2".to_string())
		);
	}

	#[test]
	fn join_respects_delimiters() {
		let values = vec!["1".to_string(), "2".to_string()];
		let mut input = command_input(Some("--scan"));

		input.multiple_delimiter = MultipleDelimiter::Space;
		assert_eq!(join_for_command_line(&input, &values), "--scan 1 2");

		input.multiple_delimiter = MultipleDelimiter::Comma;
		assert_eq!(join_for_command_line(&input, &values), "--scan 1,2");

		input.multiple_delimiter = MultipleDelimiter::QuotedSpace;
		assert_eq!(join_for_command_line(&input, &values), "--scan '1' '2'");

		input.multiple_delimiter = MultipleDelimiter::Flag;
		assert_eq!(join_for_command_line(&input, &values), "--scan 1 --scan 2");
	}

	#[test]
	fn boolean_values_map_through_true_and_false_values() {
		let input = CommandInput {
			kind: InputKind::Boolean,
			true_value: Some("--verbose".into()),
			false_value: Some("".into()),
			..Default::default()
		};
		assert_eq!(command_line_value(&input, "true"), "--verbose");
		assert_eq!(command_line_value(&input, "false"), "");
	}

	#[test]
	fn multi_select_joins_json_array() {
		let input = CommandInput {
			multi_select: true,
			multiple_delimiter: MultipleDelimiter::Comma,
			..Default::default()
		};
		assert_eq!(command_line_value(&input, r#"["a", "b"]"#), "a,b");
	}

	#[test]
	fn missing_scan_reports_required_empty_nodes() {
		let required = ExternalInput {
			required: true,
			..Default::default()
		};
		let empty = literal_tree("session", InputSource::External(required.clone()), &[]);
		let filled = literal_tree("project", InputSource::External(required), &["/p/1"]);
		assert_eq!(missing_required_inputs(&[empty, filled]), ["session"]);
	}

	#[test]
	fn candidates_match_first_property_that_hits() {
		let scans = vec![
			serde_json::json!({"id": "1", "uri": "/s/1"}),
			serde_json::json!({"id": "2", "uri": "/s/2"}),
		];
		let matched = match_candidates(&scans, Some("/s/2"), None, &["id", "uri"]);
		assert_eq!(matched.len(), 1);
		assert_eq!(matched[0].get("id"), Some(&serde_json::json!("2")));
	}
}
