use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::traits::ConfigError;

/// Name of the section whose keys are visible from every other section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Read-only INI configuration store.
///
/// Holds `section -> key -> value` as loaded from a file. Section names are
/// case-sensitive, keys are case-insensitive (stored lowercase). Keys in the
/// `[DEFAULT]` section act as fallbacks for every section but `DEFAULT` itself
/// is not reported as a section.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    /// Section names in file order.
    order: Vec<String>,
    sections: HashMap<String, HashMap<String, String>>,
    defaults: HashMap<String, String>,
}

impl ConfigStore {
    /// An empty store (no sections).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and parse an INI file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse INI text.
    ///
    /// Supported syntax:
    /// - `[section]` headers
    /// - `key = value` or `key: value` entries (first delimiter wins)
    /// - full-line comments starting with `#` or `;`
    /// - continuation lines indented deeper than their key, appended to the
    ///   value with `\n`; blank lines between continuation lines are kept,
    ///   trailing ones are dropped
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut store = Self::default();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;
        // Indent of the line that set `last_key`
        let mut key_indent = 0;
        let mut pending_blanks = 0;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                if last_key.is_some() {
                    pending_blanks += 1;
                }
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indent = raw.len() - raw.trim_start().len();

            // Continuation of the previous value
            if indent > key_indent {
                if let (Some(section), Some(key)) = (current.as_deref(), last_key.as_deref()) {
                    if let Some(value) = store.entries_mut(section).get_mut(key) {
                        for _ in 0..=pending_blanks {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                    }
                    pending_blanks = 0;
                    continue;
                }
            }
            key_indent = indent;
            pending_blanks = 0;

            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim();
                if name.is_empty() {
                    return Err(parse_error(line_no, "empty section name"));
                }
                if name != DEFAULT_SECTION {
                    if store.sections.contains_key(name) {
                        return Err(parse_error(
                            line_no,
                            format!("section '{}' already exists", name),
                        ));
                    }
                    store.order.push(name.to_string());
                    store.sections.insert(name.to_string(), HashMap::new());
                }
                current = Some(name.to_string());
                last_key = None;
                continue;
            }

            let Some(section) = current.as_deref() else {
                return Err(parse_error(line_no, "entry outside of any section"));
            };

            let (key, value) = split_entry(trimmed)
                .ok_or_else(|| parse_error(line_no, format!("expected 'key = value', got '{}'", trimmed)))?;
            if key.is_empty() {
                return Err(parse_error(line_no, "empty key"));
            }

            let entries = store.entries_mut(section);
            if entries.contains_key(&key) {
                return Err(parse_error(
                    line_no,
                    format!("key '{}' already exists in section '{}'", key, section),
                ));
            }
            entries.insert(key.clone(), value);
            last_key = Some(key);
        }

        Ok(store)
    }

    /// Section names in file order (excluding `DEFAULT`).
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Look up a value, falling back to `[DEFAULT]`.
    ///
    /// Returns `None` if the section does not exist or the key is not set.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let entries = self.sections.get(section)?;
        let key = key.to_lowercase();
        entries
            .get(&key)
            .or_else(|| self.defaults.get(&key))
            .map(String::as_str)
    }

    /// Like [`get`](Self::get), but reports which part is missing.
    pub fn require(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        if !self.has_section(section) {
            return Err(ConfigError::SectionNotFound(section.to_string()));
        }
        self.get(section, key).ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Number of sections (excluding `DEFAULT`).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn entries_mut(&mut self, section: &str) -> &mut HashMap<String, String> {
        if section == DEFAULT_SECTION {
            &mut self.defaults
        } else {
            self.sections.entry(section.to_string()).or_default()
        }
    }
}

/// Split `key = value` / `key: value` on whichever delimiter comes first.
fn split_entry(line: &str) -> Option<(String, String)> {
    let pos = line.find(['=', ':'])?;
    let key = line[..pos].trim().to_lowercase();
    let value = line[pos + 1..].trim().to_string();
    Some((key, value))
}

fn parse_error(line: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::Parse {
        line,
        message: message.into(),
    }
}
