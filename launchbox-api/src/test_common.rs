use expect_test::Expect;
use serde::{Deserialize, Serialize};

/// Parses the snapshot's JSON as `T` and serializes it back, so one
/// assertion covers field order, renames, defaults, and skip rules.
pub(crate) fn assert_eq_json_roundtrip<'a, T: Deserialize<'a> + Serialize>(expect: &'a Expect) {
	let parsed: T = serde_json::from_str(expect.data()).expect("snapshot JSON should parse");
	let rendered = serde_json::to_string_pretty(&parsed).expect("value should serialize");
	expect.assert_eq(&rendered);
}
