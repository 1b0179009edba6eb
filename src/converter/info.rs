//! Parsing of the engine's capability listings (`-formats`, `-codecs`).

use serde::{Deserialize, Serialize};

/// Command line listing the container formats.
pub const FORMATS_COMMAND: &str = "-hide_banner -formats";

/// Command line listing the codecs.
pub const CODECS_COMMAND: &str = "-hide_banner -codecs";

/// Header line introducing the `-formats` listing.
pub const FORMATS_HEADER: &str = "File formats:";

/// Header line introducing the `-codecs` listing.
pub const CODECS_HEADER: &str = "Codecs:";

/// One row of a capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Flag column, e.g. `DE` or `DEA.L.`.
    pub flags: String,
    pub name: String,
    pub description: String,
}

/// What an engine can read and write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub formats: Vec<Capability>,
    pub codecs: Vec<Capability>,
}

/// Extract the table introduced by `header` from output lines.
///
/// The section runs from the header to the first line that is blank or not
/// indented. If a separator line of dashes is present, only the rows after it
/// are kept, so the legend does not end up in the table.
pub fn parse_section(lines: &[String], header: &str) -> Vec<Capability> {
    let Some(start) = lines.iter().position(|line| line.trim() == header) else {
        return Vec::new();
    };

    let section: Vec<&str> = lines[start + 1..]
        .iter()
        .map(String::as_str)
        .take_while(|line| !line.trim().is_empty() && line.starts_with(char::is_whitespace))
        .collect();

    let rows = match section.iter().position(|line| is_separator(line)) {
        Some(separator) => &section[separator + 1..],
        None => &section[..],
    };

    rows.iter().filter_map(|line| parse_row(line)).collect()
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c == '-')
}

fn parse_row(line: &str) -> Option<Capability> {
    let line = line.trim();
    let (flags, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (name, description) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if name.is_empty() {
        return None;
    }

    Some(Capability {
        flags: flags.to_string(),
        name: name.to_string(),
        description: description.split_whitespace().collect::<Vec<_>>().join(" "),
    })
}
