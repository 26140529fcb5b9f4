use serde::{Deserialize, Serialize};

/// Reference from a dependent object to the object that manages it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
    /// True when the owner is the managing controller of the dependent.
    #[serde(default)]
    pub controller: bool,
}

/// Cache key of a namespaced object: `<namespace>/<name>`.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Split a `<namespace>/<name>` key. Returns `None` for malformed keys.
pub fn split_object_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}
