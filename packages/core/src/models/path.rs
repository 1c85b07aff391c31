//! Object paths and identity
//!
//! Absolute paths have the form `namespace:/a/b/c`. The namespace part is optional for
//! partial paths (`/a/b/c`). Object uuids are derived from the path so the same path
//! always maps to the same identity:
//!
//! - root: `sha256(sha256(lower(ns)) ++ sha256(lower(name)))`
//! - child: `sha256(sha256(lower(name)) ++ parent_uuid_bytes)`
//!
//! A segment of the form `uuid=<hex>` pins the identity at that level instead of
//! hashing its name.

use sha2::{Digest, Sha256};

pub const PATH_SEPARATOR: char = '/';
pub const NAMESPACE_DELIMITER: char = ':';
pub const DEFAULT_NAMESPACE: &str = "main";

const UUID_PREFIX: &str = "uuid=";

/// Join path parts with `/`, trimming separators between parts
pub fn combine<S: AsRef<str>>(parts: &[S]) -> String {
    let mut joined: Vec<&str> = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            joined.push(part.trim_end_matches(PATH_SEPARATOR));
        } else {
            let trimmed = part.trim_matches(PATH_SEPARATOR);
            if !trimmed.is_empty() {
                joined.push(trimmed);
            }
        }
    }

    joined.join("/").trim_end_matches(PATH_SEPARATOR).to_string()
}

/// Namespace prefix of an absolute path, if any
pub fn namespace(path: &str) -> Option<&str> {
    path.find(NAMESPACE_DELIMITER).map(|i| &path[..i])
}

/// Path without its namespace prefix
pub fn partial_path(path: &str) -> &str {
    match path.find(NAMESPACE_DELIMITER) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// `ns:/partial`
pub fn set_namespace(ns: &str, path: &str) -> String {
    format!(
        "{}{}/{}",
        ns,
        NAMESPACE_DELIMITER,
        partial_path(path).trim_start_matches(PATH_SEPARATOR)
    )
}

pub fn parent_path(path: &str) -> Option<&str> {
    let i = path.rfind(PATH_SEPARATOR)?;
    if i > 0 && i < path.len() - 1 {
        Some(&path[..i])
    } else {
        None
    }
}

/// Last segment of a path
pub fn object_name(path: &str) -> &str {
    let trimmed = partial_path(path).trim_matches(PATH_SEPARATOR);
    match trimmed.rfind(PATH_SEPARATOR) {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Every ancestor path of `path`, root first, including `path` itself
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let parts: Vec<&str> = partial_path(path)
        .split(PATH_SEPARATOR)
        .filter(|p| !p.is_empty())
        .collect();

    (1..=parts.len())
        .map(|n| format!("/{}", parts[..n].join("/")))
        .collect()
}

/// Whether the path contains expression syntax rather than naming one object
pub fn is_expression(path: &str) -> bool {
    let ns = namespace(path);
    let partial = partial_path(path);
    if partial.is_empty() {
        return false;
    }

    (ns.is_none() && !partial.starts_with(UUID_PREFIX))
        || partial.contains('*')
        || partial == "/"
        || (!partial.starts_with('/') && !partial.starts_with(UUID_PREFIX))
        || partial.contains("..")
        || partial.contains("type=")
        || partial.contains('|')
        || partial.contains('&')
        || partial.contains('~')
}

pub fn is_absolute(path: &str) -> bool {
    !is_expression(path)
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

fn sha256_pair(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Hex sha256 of the lower-cased input, used for index keys
pub fn hash_key(value: &str) -> String {
    hex::encode(sha256(value.to_lowercase().as_bytes()))
}

fn uuid_bytes(ns: &str, name: &str, parent: Option<&[u8]>) -> [u8; 32] {
    let name_hash = sha256(name.to_lowercase().as_bytes());
    match parent {
        Some(parent) if !parent.is_empty() => sha256_pair(&name_hash, parent),
        _ => sha256_pair(&sha256(ns.to_lowercase().as_bytes()), &name_hash),
    }
}

/// Uuid of a single object given its parent uuid (hex)
pub fn child_uuid(ns: &str, name: &str, parent_uuid: Option<&str>) -> String {
    let parent = parent_uuid.and_then(|p| hex::decode(p).ok());
    hex::encode(uuid_bytes(ns, name, parent.as_deref()))
}

/// Uuid of the object at `partial_path` within `ns`
///
/// Returns `None` for an empty path.
pub fn object_uuid(ns: &str, partial_path: &str) -> Option<String> {
    let ns = if ns.is_empty() { DEFAULT_NAMESPACE } else { ns };
    let mut current: Option<Vec<u8>> = None;

    for part in partial_path.split(PATH_SEPARATOR).filter(|p| !p.is_empty()) {
        let next = match part.strip_prefix(UUID_PREFIX) {
            Some(pinned) => hex::decode(pinned).ok()?,
            None => uuid_bytes(ns, part, current.as_deref()).to_vec(),
        };
        current = Some(next);
    }

    current.map(hex::encode)
}

/// Uuid of an absolute `ns:/path`, falling back to the default namespace
pub fn absolute_uuid(absolute_path: &str) -> Option<String> {
    let ns = namespace(absolute_path).unwrap_or(DEFAULT_NAMESPACE);
    object_uuid(ns, partial_path(absolute_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_trims_separators() {
        assert_eq!(combine(&["/a/", "/b/", "c/"]), "/a/b/c");
        assert_eq!(combine(&["ns:/area", "", "machine"]), "ns:/area/machine");
        assert_eq!(combine(&["/a", "/"]), "/a");
    }

    #[test]
    fn test_namespace_split() {
        assert_eq!(namespace("plant:/a/b"), Some("plant"));
        assert_eq!(partial_path("plant:/a/b"), "/a/b");
        assert_eq!(namespace("/a/b"), None);
        assert_eq!(set_namespace("plant", "/a/b"), "plant:/a/b");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent_path("/a/b/c"), Some("/a/b"));
        assert_eq!(parent_path("/a"), None);
        assert_eq!(object_name("ns:/a/b/c"), "c");
        assert_eq!(object_name("/a"), "a");
    }

    #[test]
    fn test_ancestor_paths() {
        assert_eq!(ancestor_paths("/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
    }

    #[test]
    fn test_expression_detection() {
        assert!(is_absolute("ns:/a/b"));
        assert!(is_expression("ns:/a/*"));
        assert!(is_expression("ns:/a/../b"));
        assert!(is_expression("a/b"));
        assert!(is_expression("ns:/a/type=machine"));
    }

    #[test]
    fn test_uuid_is_deterministic_and_case_insensitive() {
        let a = object_uuid("Plant", "/Area1/Machine").unwrap();
        let b = object_uuid("plant", "/area1/machine").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = object_uuid("plant", "/area2/machine").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_uuid_chain_matches_child_uuid() {
        let root = object_uuid("plant", "/area1").unwrap();
        let child = object_uuid("plant", "/area1/machine").unwrap();
        assert_eq!(child_uuid("plant", "machine", Some(&root)), child);
        assert_eq!(child_uuid("plant", "area1", None), root);
    }

    #[test]
    fn test_uuid_segment_pins_identity() {
        let root = object_uuid("plant", "/area1").unwrap();
        let pinned = object_uuid("plant", &format!("/uuid={}/machine", root)).unwrap();
        assert_eq!(pinned, object_uuid("plant", "/area1/machine").unwrap());
    }

    #[test]
    fn test_absolute_uuid_defaults_namespace() {
        assert_eq!(absolute_uuid("/a"), object_uuid(DEFAULT_NAMESPACE, "/a"));
        assert_eq!(object_uuid("ns", ""), None);
    }
}
