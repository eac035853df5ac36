use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// How synthetic dimension keys are generated.
///
/// `Sequential` and `Random` keys are only meaningful within one run.
/// `ContentHash` derives the key from the normalized value, so the same value
/// gets the same key on every rerun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPolicy {
    /// Dense integers in first-seen order, starting at 0
    #[default]
    #[serde(rename = "sequential")]
    Sequential,
    /// Random UUIDv4 strings
    #[serde(rename = "random")]
    Random,
    /// Hex SHA-256 of `namespace|value`
    #[serde(rename = "content")]
    ContentHash,
}

/// Hands out keys for one dimension according to a [`KeyPolicy`]
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    policy: KeyPolicy,
    namespace: String,
    next: usize,
}

impl KeyGenerator {
    pub fn new(policy: KeyPolicy, namespace: &str) -> Self {
        Self {
            policy,
            namespace: namespace.to_string(),
            next: 0,
        }
    }

    /// Produce the key for a value seen for the first time
    pub fn next_key(&mut self, normalized_value: &str) -> String {
        match self.policy {
            KeyPolicy::Sequential => {
                let key = self.next.to_string();
                self.next += 1;
                key
            }
            KeyPolicy::Random => Uuid::new_v4().to_string(),
            KeyPolicy::ContentHash => content_key(&self.namespace, normalized_value),
        }
    }
}

pub fn content_key(namespace: &str, normalized_value: &str) -> String {
    let mut s = String::with_capacity(namespace.len() + normalized_value.len() + 1);
    s.push_str(namespace);
    s.push('|');
    s.push_str(normalized_value);

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_keys_are_dense() {
        let mut keys = KeyGenerator::new(KeyPolicy::Sequential, "keyword");
        assert_eq!(keys.next_key("A"), "0");
        assert_eq!(keys.next_key("B"), "1");
        assert_eq!(keys.next_key("C"), "2");
    }

    #[test]
    fn test_random_keys_are_uuids() {
        let mut keys = KeyGenerator::new(KeyPolicy::Random, "keyword");
        let a = keys.next_key("A");
        let b = keys.next_key("A");
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_content_keys_are_stable_and_namespaced() {
        let mut first = KeyGenerator::new(KeyPolicy::ContentHash, "species");
        let mut second = KeyGenerator::new(KeyPolicy::ContentHash, "species");
        assert_eq!(first.next_key("Tabebuia"), second.next_key("Tabebuia"));
        assert_eq!(content_key("species", "Tabebuia").len(), 64);
        assert_ne!(content_key("species", "X"), content_key("threat", "X"));
    }
}
