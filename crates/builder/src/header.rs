//! Descriptor-to-header codec
//!
//! Compiled-firmware platforms receive the descriptor a second time as
//! a generated C-style header of `#define` lines, written over the
//! header file the firmware ships (usually `thinx.h`). Scripting
//! platforms read the JSON descriptor directly and are excluded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fwforge_errors::Error;
use serde_json::Value;
use walkdir::WalkDir;

/// Platforms that consume the JSON descriptor directly; no header is
/// generated for them.
pub const EXCLUDED_PLATFORMS: [&str; 3] = ["mongoose", "python", "nodejs"];

/// Language name embedded into generated artifacts for a platform.
#[must_use]
pub fn language_name_for_platform(platform: &str) -> &'static str {
    match platform {
        "micropython" | "python" => "Python",
        "nodejs" => "JavaScript",
        // arduino, platformio, espidf, mongoose and the MCU families
        _ => "C",
    }
}

/// Render the descriptor as `#define` lines. String values may carry
/// `%%KEY%%` placeholders which are substituted from the replacement
/// map first, then from the descriptor's own values.
#[must_use]
pub fn process(descriptor: &Value, replacements: &HashMap<String, String>) -> String {
    let Some(map) = descriptor.as_object() else {
        return String::new();
    };
    let mut lines = Vec::with_capacity(map.len());
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => format!("\"{}\"", substitute(s, replacements, map)),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        lines.push(format!("#define {key}={rendered}"));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write the rendered header over the target file.
///
/// # Errors
///
/// Returns an error when the header cannot be written.
pub fn convert(descriptor: &Value, header_path: &Path) -> Result<(), Error> {
    let replacements = HashMap::new();
    let content = process(descriptor, &replacements);
    std::fs::write(header_path, content).map_err(|e| Error::io_with_path(&e, header_path))?;
    Ok(())
}

/// Locate the expected header file anywhere under the project tree.
#[must_use]
pub fn find_header_file(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file() && entry.file_name().to_string_lossy() == name
        })
        .map(walkdir::DirEntry::into_path)
}

fn substitute(
    input: &str,
    replacements: &HashMap<String, String>,
    descriptor: &serde_json::Map<String, Value>,
) -> String {
    let mut out = input.to_string();
    while let Some(start) = out.find("%%") {
        let Some(rel_end) = out[start + 2..].find("%%") else {
            break;
        };
        let end = start + 2 + rel_end;
        let key = out[start + 2..end].to_string();
        let replacement = replacements
            .get(&key)
            .cloned()
            .or_else(|| {
                descriptor
                    .get(&key)
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_default();
        out.replace_range(start..end + 2, &replacement);
    }
    out
}
