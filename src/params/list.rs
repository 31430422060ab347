use std::collections::HashMap;

use crate::core::ArcStr;
use crate::params::PropertySpec;

/// An insertion-ordered collection of [`PropertySpec`]s with unique names.
///
/// The list keeps a structural hash that is updated on every mutation. The
/// hash is order-independent (an XOR over per-entry hashes of name and type),
/// so two lists holding the same specs compare equal regardless of the order
/// in which they were assembled.
#[derive(Clone, Default)]
pub struct PropertyList {
    specs: Vec<PropertySpec>,
    index: HashMap<ArcStr, usize>,
    hash: u64,
}

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `spec` unless a spec with the same name is already present.
    /// Returns whether the spec was inserted.
    pub fn insert_back(&mut self, spec: PropertySpec) -> bool {
        if self.index.contains_key(&spec.name) {
            return false;
        }

        self.hash ^= spec.structural_hash();
        self.index.insert(spec.name.clone(), self.specs.len());
        self.specs.push(spec);
        true
    }

    /// Appends every spec of `other` whose name is not present yet. Returns
    /// the number of inserted specs.
    pub fn merge(&mut self, other: &PropertyList) -> usize {
        other
            .specs
            .iter()
            .filter(|spec| self.insert_back((*spec).clone()))
            .count()
    }

    /// Removes the spec with the given name. Returns whether it existed.
    pub fn erase(&mut self, name: &str) -> bool {
        let Some(position) = self.index.remove(name) else {
            return false;
        };

        let spec = self.specs.remove(position);
        self.hash ^= spec.structural_hash();

        for index in self.index.values_mut() {
            if *index > position {
                *index -= 1;
            }
        }

        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertySpec> {
        self.index.get(name).map(|&index| &self.specs[index])
    }

    /// Specs in insertion order.
    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &ArcStr> + '_ {
        self.specs.iter().map(|spec| &spec.name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PropertySpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Order-independent structural hash of names and types.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for PropertyList {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.specs.len() == other.specs.len()
    }
}

impl Eq for PropertyList {}

impl std::hash::Hash for PropertyList {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl FromIterator<PropertySpec> for PropertyList {
    fn from_iter<I: IntoIterator<Item = PropertySpec>>(iter: I) -> Self {
        let mut list = PropertyList::new();
        for spec in iter {
            list.insert_back(spec);
        }
        list
    }
}

impl Extend<PropertySpec> for PropertyList {
    fn extend<I: IntoIterator<Item = PropertySpec>>(&mut self, iter: I) {
        for spec in iter {
            self.insert_back(spec);
        }
    }
}

impl<'a> IntoIterator for &'a PropertyList {
    type Item = &'a PropertySpec;
    type IntoIter = std::slice::Iter<'a, PropertySpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

impl std::fmt::Debug for PropertyList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.specs.iter()).finish()
    }
}
