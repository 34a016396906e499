use std::fmt;
use std::str::FromStr;

/// Identifies a `Submarine` parent by namespace and name, the work queue key
/// described in the glossary as `"<namespace>/<name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Error returned when a work queue key string doesn't follow `"<namespace>/<name>"`.
#[derive(Debug, thiserror::Error)]
#[error("invalid work queue key {0:?}, expected \"<namespace>/<name>\"")]
pub struct ParseKeyError(String);

impl FromStr for ObjectKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(ObjectKey::new(namespace, name))
            }
            _ => Err(ParseKeyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_namespace_slash_name() {
        let key = ObjectKey::new("default", "ex");
        assert_eq!(key.to_string(), "default/ex");
    }

    #[test]
    fn round_trips_through_parse() {
        let key: ObjectKey = "default/ex".parse().unwrap();
        assert_eq!(key, ObjectKey::new("default", "ex"));
    }

    #[test]
    fn rejects_keys_without_a_namespace() {
        assert!("ex".parse::<ObjectKey>().is_err());
        assert!("/ex".parse::<ObjectKey>().is_err());
        assert!("default/".parse::<ObjectKey>().is_err());
    }
}
