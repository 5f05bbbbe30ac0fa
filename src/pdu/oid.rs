//! Object Identifiers.

use std::cmp::Ordering;
use std::fmt;

use crate::{Error, Result};

/// A dotted-decimal Object Identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Oid {
    pub components: Vec<u32>,
}

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    pub fn from_string(s: &str) -> Result<Self> {
        let components: std::result::Result<Vec<u32>, _> = s
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>())
            .collect();

        components
            .map(Self::new)
            .map_err(|_| Error::parse(format!("invalid OID: {}", s)))
    }

    pub fn append(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self::new(components)
    }

    /// True if `self` is a strict prefix of `other` (§4.5 column-walk test).
    pub fn is_prefix_of(&self, other: &Oid) -> bool {
        self.components.len() < other.components.len()
            && self.components[..] == other.components[..self.components.len()]
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strs: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", strs.join("."))
    }
}

/// Lexicographic order, used by `lexicographicMode` walks and GET-NEXT
/// resolution (spec.md §4.5).
impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl From<Vec<u32>> for Oid {
    fn from(components: Vec<u32>) -> Self {
        Self::new(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_decimal() {
        let oid = Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap();
        assert_eq!(oid.components, vec![1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Oid::from_string("1.3.x.1").is_err());
    }

    #[test]
    fn prefix_test() {
        let head = Oid::from_string("1.3.6.1.2.1.2.2.1.2").unwrap();
        let row = Oid::from_string("1.3.6.1.2.1.2.2.1.2.1").unwrap();
        let other = Oid::from_string("1.3.6.1.2.1.2.2.1.3.1").unwrap();
        assert!(head.is_prefix_of(&row));
        assert!(!head.is_prefix_of(&other));
        assert!(!head.is_prefix_of(&head));
    }

    #[test]
    fn lexicographic_order() {
        let a = Oid::from_string("1.3.6.1.2.1.2.2.1.2.1").unwrap();
        let b = Oid::from_string("1.3.6.1.2.1.2.2.1.2.2").unwrap();
        assert!(a < b);
    }
}
