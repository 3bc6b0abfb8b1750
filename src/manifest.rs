use std::path::{Component, Path};
use thiserror::Error;

/// One physical file: where it lives in its directory, where to fetch it, and how big it must be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name inside the directory of the enclosing node
    pub name: String,
    /// Remote source
    pub url: String,
    /// Byte size a complete download must have
    pub expected_size: u64,
}

impl FileEntry {
    /// Creates a new entry
    pub fn new(name: impl Into<String>, url: impl Into<String>, expected_size: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            expected_size,
        }
    }
}

/// Declarative description of expected files
///
/// Namespace keys become subdirectories; recursion ends at `File` and `List` leaves.
/// Namespace children keep their insertion order, which is also the download order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestNode {
    /// A single file in the current directory
    File(FileEntry),
    /// Several files sharing the current directory
    List(Vec<FileEntry>),
    /// Named subdirectories, each described by its own node
    Namespace(Vec<(String, ManifestNode)>),
}

/// Errors describing a malformed manifest
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    /// A file name or namespace key is not a single plain path component
    #[error("invalid path component {name:?} at {location}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Dotted key path where it was found, `[i]` for list positions
        location: String,
    },

    /// A node is neither a file entry, a list of entries, nor a namespace
    #[error("unexpected {found} at {location}, expected a file entry, file list or namespace")]
    UnexpectedNode {
        /// TOML type that was found
        found: &'static str,
        /// Dotted key path where it was found
        location: String,
    },

    /// A file entry field is missing or has the wrong type
    #[error("file entry at {location} has missing or invalid field `{field}`")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Dotted key path of the entry
        location: String,
    },

    /// A file entry carries a key it does not understand
    #[error("file entry at {location} has unknown field `{field}`")]
    UnknownField {
        /// Field name
        field: String,
        /// Dotted key path of the entry
        location: String,
    },

    /// The document is not valid TOML
    #[error("failed to parse manifest TOML: {0}")]
    Parse(String),
}

impl ManifestNode {
    /// Single file leaf
    pub fn file(name: impl Into<String>, url: impl Into<String>, expected_size: u64) -> Self {
        Self::File(FileEntry::new(name, url, expected_size))
    }

    /// File list leaf
    pub fn list(entries: impl IntoIterator<Item = FileEntry>) -> Self {
        Self::List(entries.into_iter().collect())
    }

    /// Namespace node, children in iteration order
    pub fn namespace<K: Into<String>>(children: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Namespace(
            children
                .into_iter()
                .map(|(key, node)| (key.into(), node))
                .collect(),
        )
    }

    /// Number of file entries reachable from this node
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self {
            Self::File(_) => 1,
            Self::List(entries) => entries.len(),
            Self::Namespace(children) => children.iter().map(|(_, node)| node.entry_count()).sum(),
        }
    }

    /// Child of a namespace by key; `None` for leaves and unknown keys
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Namespace(children) => children
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, node)| node),
            Self::File(_) | Self::List(_) => None,
        }
    }

    /// Checks every file name and namespace key in this subtree
    ///
    /// Locations in errors are dotted key paths, with `[i]` for list positions.
    ///
    /// # Errors
    /// Returns `InvalidName` for the first name that is not a single plain path component
    pub fn validate(&self) -> Result<(), ManifestError> {
        self.validate_at("<root>")
    }

    fn validate_at(&self, location: &str) -> Result<(), ManifestError> {
        match self {
            Self::File(entry) => validate_component(&entry.name, location),
            Self::List(entries) => entries.iter().enumerate().try_for_each(|(index, entry)| {
                validate_component(&entry.name, &format!("{location}[{index}]"))
            }),
            Self::Namespace(children) => children.iter().try_for_each(|(key, child)| {
                let nested = child_location(location, key);
                validate_component(key, &nested)?;
                child.validate_at(&nested)
            }),
        }
    }

    /// Parses a manifest from a TOML document
    ///
    /// A table whose `url` key holds a string is a file entry (`name`, `url`, `size`),
    /// an array is a file list, and any other table is a namespace.
    ///
    /// # Errors
    /// Returns error if the document is not TOML or any node is malformed
    pub fn from_toml_str(contents: &str) -> Result<Self, ManifestError> {
        let table: toml::Table =
            toml::from_str(contents).map_err(|e| ManifestError::Parse(e.to_string()))?;
        parse_table(&table, "<root>")
    }

    /// Parses a manifest node from an already-decoded TOML value
    ///
    /// # Errors
    /// Returns error if the value or any of its children is malformed
    pub fn from_toml_value(value: &toml::Value) -> Result<Self, ManifestError> {
        parse_value(value, "<root>")
    }
}

/// Checks that `name` is a single normal path component
///
/// # Errors
/// Returns `InvalidName` for empty names, `.`/`..`, separators or absolute paths
pub fn validate_component(name: &str, location: &str) -> Result<(), ManifestError> {
    let invalid = || ManifestError::InvalidName {
        name: name.to_owned(),
        location: location.to_owned(),
    };

    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

fn child_location(parent: &str, key: &str) -> String {
    if parent == "<root>" {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

const fn type_name(value: &toml::Value) -> &'static str {
    match value {
        toml::Value::String(_) => "string",
        toml::Value::Integer(_) => "integer",
        toml::Value::Float(_) => "float",
        toml::Value::Boolean(_) => "boolean",
        toml::Value::Datetime(_) => "datetime",
        toml::Value::Array(_) => "array",
        toml::Value::Table(_) => "table",
    }
}

/// Only a string `url` marks a file entry; a `url` subtable is a subdirectory
fn is_entry(table: &toml::Table) -> bool {
    table.get("url").is_some_and(toml::Value::is_str)
}

fn parse_value(value: &toml::Value, location: &str) -> Result<ManifestNode, ManifestError> {
    match value {
        toml::Value::Table(table) => parse_table(table, location),
        toml::Value::Array(items) => {
            let entries = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let item_location = format!("{location}[{index}]");
                    match item {
                        toml::Value::Table(table) if is_entry(table) => {
                            parse_entry(table, &item_location)
                        }
                        other => Err(ManifestError::UnexpectedNode {
                            found: type_name(other),
                            location: item_location,
                        }),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ManifestNode::List(entries))
        }
        other => Err(ManifestError::UnexpectedNode {
            found: type_name(other),
            location: location.to_owned(),
        }),
    }
}

fn parse_table(table: &toml::Table, location: &str) -> Result<ManifestNode, ManifestError> {
    if is_entry(table) {
        return parse_entry(table, location).map(ManifestNode::File);
    }

    let children = table
        .iter()
        .map(|(key, value)| {
            let child = child_location(location, key);
            validate_component(key, &child)?;
            Ok((key.clone(), parse_value(value, &child)?))
        })
        .collect::<Result<Vec<_>, ManifestError>>()?;

    Ok(ManifestNode::Namespace(children))
}

fn parse_entry(table: &toml::Table, location: &str) -> Result<FileEntry, ManifestError> {
    if let Some(field) = table
        .keys()
        .find(|key| !matches!(key.as_str(), "name" | "url" | "size"))
    {
        return Err(ManifestError::UnknownField {
            field: field.clone(),
            location: location.to_owned(),
        });
    }

    let invalid = |field| ManifestError::InvalidField {
        field,
        location: location.to_owned(),
    };

    let name = table
        .get("name")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| invalid("name"))?;
    let url = table
        .get("url")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| invalid("url"))?;
    let size = table
        .get("size")
        .and_then(toml::Value::as_integer)
        .and_then(|size| u64::try_from(size).ok())
        .ok_or_else(|| invalid("size"))?;

    validate_component(name, location)?;

    Ok(FileEntry::new(name, url, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_component() {
        assert!(validate_component("model.bin", "x").is_ok());
        assert!(validate_component("tiny.en", "x").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "/abs"] {
            assert!(validate_component(bad, "x").is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_entry_count_and_get() {
        let manifest = ManifestNode::namespace([
            ("a", ManifestNode::file("f", "http://x/f", 1)),
            (
                "b",
                ManifestNode::list([
                    FileEntry::new("g", "http://x/g", 2),
                    FileEntry::new("h", "http://x/h", 3),
                ]),
            ),
            ("empty", ManifestNode::namespace(Vec::<(String, ManifestNode)>::new())),
        ]);

        assert_eq!(manifest.entry_count(), 3);
        assert_eq!(manifest.get("a"), Some(&ManifestNode::file("f", "http://x/f", 1)));
        assert!(manifest.get("missing").is_none());
        assert!(manifest.get("a").and_then(|a| a.get("f")).is_none());
    }

    #[test]
    fn test_parse_nested_manifest_preserves_order() {
        let manifest = ManifestNode::from_toml_str(
            r#"
[zeta.generator]
name = "g_00140000"
url = "https://example.com/g"
size = 213

[[zeta.bert]]
name = "pytorch_model.bin"
url = "https://example.com/bin"
size = 386

[[zeta.bert]]
name = "config.json"
url = "https://example.com/config"
size = 539

[alpha]
name = "a.pt"
url = "https://example.com/a"
size = 7
"#,
        )
        .unwrap();

        let expected = ManifestNode::namespace([
            (
                "zeta",
                ManifestNode::namespace([
                    ("generator", ManifestNode::file("g_00140000", "https://example.com/g", 213)),
                    (
                        "bert",
                        ManifestNode::list([
                            FileEntry::new("pytorch_model.bin", "https://example.com/bin", 386),
                            FileEntry::new("config.json", "https://example.com/config", 539),
                        ]),
                    ),
                ]),
            ),
            ("alpha", ManifestNode::file("a.pt", "https://example.com/a", 7)),
        ]);
        assert_eq!(manifest, expected);
    }

    #[test]
    fn test_parse_root_file_entry() {
        let manifest =
            ManifestNode::from_toml_str("name = \"w.bin\"\nurl = \"http://x/w\"\nsize = 100\n")
                .unwrap();
        assert_eq!(manifest, ManifestNode::file("w.bin", "http://x/w", 100));
    }

    #[test]
    fn test_parse_rejects_scalar_node() {
        let err = ManifestNode::from_toml_str("[models]\ntiny = 42\n").unwrap_err();
        assert_eq!(
            err,
            ManifestError::UnexpectedNode {
                found: "integer",
                location: "models.tiny".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_entry_in_list() {
        let err = ManifestNode::from_toml_str("files = [\"a\", \"b\"]\n").unwrap_err();
        assert!(matches!(err, ManifestError::UnexpectedNode { found: "string", .. }));
    }

    #[test]
    fn test_parse_rejects_bad_entry_fields() {
        let missing_size = "[m]\nname = \"a\"\nurl = \"http://x\"\n";
        assert_eq!(
            ManifestNode::from_toml_str(missing_size).unwrap_err(),
            ManifestError::InvalidField {
                field: "size",
                location: "m".to_owned(),
            }
        );

        let negative = "[m]\nname = \"a\"\nurl = \"http://x\"\nsize = -1\n";
        assert!(matches!(
            ManifestNode::from_toml_str(negative).unwrap_err(),
            ManifestError::InvalidField { field: "size", .. }
        ));

        let extra = "[m]\nname = \"a\"\nurl = \"http://x\"\nsize = 1\nsha = \"ff\"\n";
        assert!(matches!(
            ManifestNode::from_toml_str(extra).unwrap_err(),
            ManifestError::UnknownField { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_traversal() {
        let entry = "[m]\nname = \"../evil\"\nurl = \"http://x\"\nsize = 1\n";
        assert!(matches!(
            ManifestNode::from_toml_str(entry).unwrap_err(),
            ManifestError::InvalidName { .. }
        ));

        let key = "[\"..\".m]\nname = \"ok\"\nurl = \"http://x\"\nsize = 1\n";
        assert!(matches!(
            ManifestNode::from_toml_str(key).unwrap_err(),
            ManifestError::InvalidName { .. }
        ));
    }

    #[test]
    fn test_from_toml_value_array_is_file_list() {
        let value: toml::Value = toml::from_str::<toml::Table>(
            "files = [{ name = \"w.bin\", url = \"http://x/1\", size = 100 }, \
             { name = \"v.txt\", url = \"http://x/2\", size = 10 }]\n",
        )
        .unwrap()
        .remove("files")
        .unwrap();

        assert_eq!(
            ManifestNode::from_toml_value(&value).unwrap(),
            ManifestNode::list([
                FileEntry::new("w.bin", "http://x/1", 100),
                FileEntry::new("v.txt", "http://x/2", 10),
            ])
        );
        assert!(ManifestNode::from_toml_value(&toml::Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_url_subtable_is_a_directory() {
        let manifest = ManifestNode::from_toml_str(
            "[mirror.url]\nname = \"a.pt\"\nurl = \"http://x/a\"\nsize = 1\n",
        )
        .unwrap();

        assert_eq!(
            manifest,
            ManifestNode::namespace([(
                "mirror",
                ManifestNode::namespace([("url", ManifestNode::file("a.pt", "http://x/a", 1))]),
            )])
        );
    }

    #[test]
    fn test_validate_reports_dotted_location() {
        let manifest = ManifestNode::namespace([(
            "opus-mt-zh-en",
            ManifestNode::list([
                FileEntry::new("config.json", "http://x/c", 1),
                FileEntry::new("", "http://x/empty", 1),
            ]),
        )]);

        assert_eq!(
            manifest.validate().unwrap_err(),
            ManifestError::InvalidName {
                name: String::new(),
                location: "opus-mt-zh-en[1]".to_owned(),
            }
        );
        assert!(ManifestNode::file("ok.bin", "http://x", 1).validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(matches!(
            ManifestNode::from_toml_str("[unterminated").unwrap_err(),
            ManifestError::Parse(_)
        ));
    }
}
