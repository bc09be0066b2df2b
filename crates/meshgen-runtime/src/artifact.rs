//! Output artifacts and download-name sanitization

use crate::pipeline::ArtifactKind;

/// Base name used when the client name sanitizes to nothing
pub const FALLBACK_BASE_NAME: &str = "output";

const MAX_NAME_BYTES: usize = 255;

const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitized, extension-less base name for a generated artifact.
///
/// Never empty and never contains path separators, reserved characters or
/// control characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    base: String,
}

impl ArtifactName {
    /// Derive a base name from the client-supplied upload name.
    pub fn from_upload(file_name: Option<&str>) -> Self {
        let base = file_name
            .map(sanitize_file_name)
            .map(|safe| strip_extension(&safe).to_string())
            .map(|stem| trim_name(&stem).to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `<base>.<ext>` for the given artifact kind.
    pub fn file_name(&self, kind: ArtifactKind) -> String {
        format!("{}.{}", self.base, kind.extension())
    }
}

impl Default for ArtifactName {
    fn default() -> Self {
        Self {
            base: FALLBACK_BASE_NAME.to_string(),
        }
    }
}

/// A complete generated model, returned once to the caller and not retained.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub name: ArtifactName,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

impl OutputArtifact {
    pub fn file_name(&self) -> String {
        self.name.file_name(self.kind)
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Make a client-supplied file name safe to use as a file name.
///
/// Removes path separators, characters reserved on common filesystems and
/// control characters, trims surrounding whitespace and dots, escapes Windows
/// device names and truncates to 255 bytes. May return an empty string.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !UNSAFE_CHARS.contains(c))
        .collect();
    let mut safe = trim_name(&cleaned).to_string();

    let stem = safe.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem.trim())) {
        safe.insert_str(0, "__");
    }

    truncate_on_char_boundary(&mut safe, MAX_NAME_BYTES);
    trim_name(&safe).to_string()
}

fn trim_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// Drop the final `.ext`, keeping names that only start with a dot intact.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
