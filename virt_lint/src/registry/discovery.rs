//! Script validator discovery
//!
//! Every `*.lua` file below a search location is a validator. Its identifier is the
//! relative path without extension, its tags are each ancestor of that path
//! (`common`, `common/check_numa`) plus any declared in the metadata header.
//!
//! The header is the run of comment lines at the top of the file. Lines of the form
//! `-- virt-lint: <directive>` are parsed:
//!
//! ```text
//! -- virt-lint: requires-connection
//! -- virt-lint: tags = numa, memory
//! ```

use super::{Validator, ValidatorKind};
use crate::errors::DiscoveryError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

pub const SCRIPT_EXTENSION: &str = "lua";

const DIRECTIVE_PREFIX: &str = "virt-lint:";

/// Declared script metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMetadata {
    pub requires_connection: bool,
    pub tags: Vec<String>,
}

/// Scan one location. A missing location yields `Ok(None)`.
pub fn discover_location(location: &Path) -> Result<Option<Vec<Validator>>, DiscoveryError> {
    match fs::metadata(location) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DiscoveryError::UnreadableLocation {
                path: location.to_path_buf(),
                reason: e.to_string(),
            })
        }
        Ok(meta) if !meta.is_dir() => {
            return Err(DiscoveryError::UnreadableLocation {
                path: location.to_path_buf(),
                reason: "not a directory".to_string(),
            })
        }
        Ok(_) => {}
    }

    let mut validators = Vec::new();
    let walker = WalkDir::new(location)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry.map_err(|e| DiscoveryError::UnreadableLocation {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| location.to_path_buf()),
            reason: e.to_string(),
        })?;

        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION)
        {
            continue;
        }

        validators.push(load_script(location, path)?);
    }

    Ok(Some(validators))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn load_script(location: &Path, path: &Path) -> Result<Validator, DiscoveryError> {
    let id = script_id(location, path).ok_or_else(|| DiscoveryError::UnreadableLocation {
        path: path.to_path_buf(),
        reason: "file name is not valid UTF-8".to_string(),
    })?;

    let source = std::fs::read_to_string(path).map_err(|e| DiscoveryError::UnreadableLocation {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let metadata = parse_metadata(path, &source)?;

    let tags = path_tags(&id).into_iter().chain(metadata.tags);

    Ok(Validator::new(
        id,
        tags,
        metadata.requires_connection,
        ValidatorKind::Script(path.to_path_buf()),
    ))
}

/// `common/check_numa` for `<location>/common/check_numa.lua`
fn script_id(location: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(location).ok()?.with_extension("");
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Every ancestor of a script id, the id itself included
pub fn path_tags(id: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut prefix = String::new();
    for part in id.split('/') {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(part);
        tags.push(prefix.clone());
    }
    tags
}

/// Parse the leading comment block of a script
pub fn parse_metadata(path: &Path, source: &str) -> Result<ScriptMetadata, DiscoveryError> {
    let mut metadata = ScriptMetadata::default();

    for (index, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || (index == 0 && trimmed.starts_with("#!")) {
            continue;
        }
        let Some(comment) = trimmed.strip_prefix("--") else {
            break;
        };
        let Some(directive) = comment.trim().strip_prefix(DIRECTIVE_PREFIX) else {
            continue;
        };

        apply_directive(&mut metadata, directive.trim()).map_err(|reason| {
            DiscoveryError::MalformedMetadata {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            }
        })?;
    }

    Ok(metadata)
}

fn apply_directive(metadata: &mut ScriptMetadata, directive: &str) -> Result<(), String> {
    let (name, value) = match directive.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => (directive, None),
    };

    match name {
        "requires-connection" => {
            metadata.requires_connection = match value {
                None | Some("true") => true,
                Some("false") => false,
                Some(other) => return Err(format!("expected true or false, found '{other}'")),
            };
        }
        "tags" => {
            let value = value.ok_or("tags directive needs a value")?;
            for tag in value.split(',').map(str::trim) {
                if !is_valid_tag(tag) {
                    return Err(format!("invalid tag '{tag}'"));
                }
                metadata.tags.push(tag.to_string());
            }
        }
        other => return Err(format!("unknown directive '{other}'")),
    }

    Ok(())
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('/')
        && !tag.ends_with('/')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_path_tags() {
        assert_eq!(
            path_tags("common/check_numa"),
            vec!["common".to_string(), "common/check_numa".to_string()]
        );
        assert_eq!(path_tags("top"), vec!["top".to_string()]);
    }

    #[test]
    fn test_metadata_directives() {
        let source = "#!/usr/bin/env lua\n\
                      -- Checks things\n\
                      -- virt-lint: requires-connection\n\
                      -- virt-lint: tags = numa, memory\n\
                      \n\
                      local x = 1\n\
                      -- virt-lint: tags = ignored-after-code\n";
        let metadata = parse_metadata(Path::new("x.lua"), source).unwrap();

        assert!(metadata.requires_connection);
        assert_eq!(metadata.tags, vec!["numa".to_string(), "memory".to_string()]);
    }

    #[test]
    fn test_metadata_explicit_false() {
        let metadata =
            parse_metadata(Path::new("x.lua"), "-- virt-lint: requires-connection = false\n")
                .unwrap();
        assert!(!metadata.requires_connection);
    }

    #[test]
    fn test_malformed_metadata() {
        let result = parse_metadata(Path::new("x.lua"), "--\n-- virt-lint: frobnicate\n");
        assert_matches!(
            result,
            Err(DiscoveryError::MalformedMetadata { line: 2, reason, .. }) if reason.contains("frobnicate")
        );

        let result = parse_metadata(Path::new("x.lua"), "-- virt-lint: tags = ok, bad tag\n");
        assert_matches!(result, Err(DiscoveryError::MalformedMetadata { line: 1, .. }));

        let result =
            parse_metadata(Path::new("x.lua"), "-- virt-lint: requires-connection = maybe\n");
        assert_matches!(result, Err(DiscoveryError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_discover_location() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("common")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(
            dir.path().join("common/check_b.lua"),
            "-- virt-lint: requires-connection\n-- virt-lint: tags = extra\n",
        )
        .unwrap();
        fs::write(dir.path().join("common/check_a.lua"), "return\n").unwrap();
        fs::write(dir.path().join("common/notes.txt"), "not a validator").unwrap();
        fs::write(dir.path().join(".hidden/secret.lua"), "").unwrap();

        let found = discover_location(dir.path()).unwrap().unwrap();
        let ids: Vec<&str> = found.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["common/check_a", "common/check_b"]);

        assert!(!found[0].requires_connection());
        assert!(found[1].requires_connection());
        assert_eq!(
            found[1].tags(),
            &[
                "common".to_string(),
                "common/check_b".to_string(),
                "extra".to_string()
            ]
        );
        assert_eq!(
            found[0].script_path(),
            Some(dir.path().join("common/check_a.lua").as_path())
        );
    }

    #[test]
    fn test_missing_and_unreadable_locations() {
        let dir = tempdir().unwrap();
        assert!(discover_location(&dir.path().join("none")).unwrap().is_none());

        let file = dir.path().join("file.lua");
        fs::write(&file, "").unwrap();
        assert_matches!(
            discover_location(&file),
            Err(DiscoveryError::UnreadableLocation { .. })
        );
    }

    #[test]
    fn test_location_that_cannot_be_reached_is_not_missing() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "").unwrap();

        // Resolving through a regular file fails with something other than NotFound
        let below = file.join("validators");
        assert_matches!(
            discover_location(&below),
            Err(DiscoveryError::UnreadableLocation { path, .. }) if path == below
        );
    }

    #[test]
    fn test_malformed_script_fails_discovery() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.lua"), "-- virt-lint: tags =\n").unwrap();

        assert_matches!(
            discover_location(dir.path()),
            Err(DiscoveryError::MalformedMetadata { .. })
        );
    }
}
