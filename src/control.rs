//! Contains parsing and rendering of Debian-styled control text.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Control file rendered into the metadata database of a new target.
///
/// Placeholders are substituted by [`render_template`]; the names are part
/// of the tool contract and must not change.
pub(crate) const ADMINDIR_TEMPLATE: &str = "\
Architecture: @ARCHITECTURE@
Maintainer: @MAINTAINER.NAME@ <@MAINTAINER.EMAIL@>
Distribution: @DISTRIBUTION@
";

/// Substitute `@KEY@` placeholders in a control template.
pub(crate) fn render_template(template: &str, values: &[(&str, &str)]) -> String {
	let mut out = template.to_string();
	for (key, value) in values {
		out = out.replace(&format!("@{key}@"), value);
	}
	out
}

/// One parsed `Key: value` paragraph, as printed by the tool's field
/// queries.
///
/// Indented lines extend the previous field's value with a newline, the
/// way Debian control continuations do. Comment lines (`#`) are ignored.
#[derive(Debug)]
pub struct ControlSection {
	data: HashMap<String, String>,
}

impl ControlSection {
	fn line_is_key(line: &str) -> bool { !line.starts_with(' ') && !line.starts_with('\t') }

	/// Parse a single paragraph of control text.
	pub fn parse(text: &str) -> Result<ControlSection> {
		let mut data = HashMap::new();
		let mut current_key: Option<String> = None;

		for (index, line) in text.lines().enumerate() {
			if line.starts_with('#') || line.trim().is_empty() {
				continue;
			}

			if Self::line_is_key(line) {
				let Some((key, value)) = line.split_once(':') else {
					return Err(Error::parse(
						"control text",
						format!("line {} has no ':' separator", index + 1),
					));
				};
				let value = value.strip_prefix(' ').unwrap_or(value);
				current_key = Some(key.to_string());
				data.insert(key.to_string(), value.to_string());
				continue;
			}

			// Indented continuation of the previous field.
			match &current_key {
				Some(key) => {
					let value = data.entry(key.clone()).or_default();
					value.push('\n');
					value.push_str(line);
				},
				None => {
					return Err(Error::parse(
						"control text",
						format!("line {} is indented but no field is open", index + 1),
					));
				},
			}
		}

		Ok(ControlSection { data })
	}

	/// Get the value of the specified field.
	pub fn get(&self, key: &str) -> Option<&String> { self.data.get(key) }

	/// Get the value of the specified field, or a default when absent.
	pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
		match self.data.get(key) {
			Some(value) => value,
			None => default,
		}
	}

	/// The underlying field map.
	pub fn fields(&self) -> &HashMap<String, String> { &self.data }
}

impl From<ControlSection> for HashMap<String, String> {
	fn from(section: ControlSection) -> Self { section.data }
}
