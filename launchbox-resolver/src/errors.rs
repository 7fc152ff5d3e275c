pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of command resolution. Every variant carries enough
/// context to tell the caller which declaration or value to fix.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The wrapper's input declarations do not form a valid tree.
	#[error("invalid input tree: {reason}")]
	TreeConstruction { reason: String },

	/// An embedded `^...^` reference in a template matched more than one
	/// value.
	#[error("reference \"{query}\" matched {count} values, expected exactly one")]
	AmbiguousReference { query: String, count: usize },

	/// An input resolved to several values in a position where exactly
	/// one is needed.
	#[error("input \"{input}\" resolved to multiple values, expected exactly one")]
	AmbiguousValue { input: String },

	#[error("missing values for required input(s): {}", inputs.join(", "))]
	MissingRequiredInputs { inputs: Vec<String> },

	#[error("user \"{user}\" does not have permission to {action} {object}")]
	Unauthorized {
		user: String,
		action: &'static str,
		object: String,
	},

	#[error("input \"{input}\" contains the illegal sequence \"{fragment}\"")]
	IllegalInputValue { input: String, fragment: String },

	#[error("could not resolve mount \"{mount}\": {reason}")]
	MountResolution { mount: String, reason: String },

	#[error("could not resolve output \"{output}\": {reason}")]
	OutputResolution { output: String, reason: String },

	/// A declared setup or wrap-up image could not be turned into a
	/// usable sub-command.
	#[error("could not resolve {role} command \"{image}\": {reason}")]
	Subcommand {
		role: &'static str,
		image: String,
		reason: String,
	},

	#[error("staging failed: {msg}: {cause}")]
	Staging {
		msg: String,
		#[source]
		cause: std::io::Error,
	},

	#[error("serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	pub(crate) fn tree(reason: impl Into<String>) -> Error {
		Error::TreeConstruction { reason: reason.into() }
	}

	pub(crate) fn mount(mount: impl Into<String>, reason: impl Into<String>) -> Error {
		Error::MountResolution {
			mount: mount.into(),
			reason: reason.into(),
		}
	}

	pub(crate) fn output(output: impl Into<String>, reason: impl Into<String>) -> Error {
		Error::OutputResolution {
			output: output.into(),
			reason: reason.into(),
		}
	}

	pub(crate) fn staging(msg: impl Into<String>, cause: std::io::Error) -> Error {
		Error::Staging { msg: msg.into(), cause }
	}
}
