//! Hierarchical property name redirection.
//!
//! An alias maps a *proxy* (the name a task asks for) to a *provider* (the
//! name actually used in the property store). Providers can themselves be
//! proxies, so resolution follows the chain until a name is no longer
//! aliased. Tables can be layered: a table first consults its own entries
//! and then each of its parents in order.
//!
//! Parents are borrowed, never owned. A nested scope typically builds a
//! short-lived table on top of the caller's one, so the borrow checker is
//! what guarantees that every parent outlives its children.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::core::{ArcStr, hash_one};
use crate::error::AliasError;

/// A proxy → provider table with optional parent tables.
///
/// The identity hash is taken over the effective redirections: every proxy
/// known to the hierarchy paired with the provider it is directly redirected
/// to, after shadowing. Two tables redirecting every name the same way hash
/// equal no matter how their entries are layered, so the hash can be used as
/// a cache key for anything built under these aliases.
#[derive(Clone, Default)]
pub struct ParamAliases<'p> {
    parents: Vec<&'p ParamAliases<'p>>,
    local: BTreeMap<ArcStr, ArcStr>,
    hash: u64,
}

impl<'p> ParamAliases<'p> {
    /// An empty table which resolves every name to itself.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ParamAliasesBuilder<'p> {
        ParamAliasesBuilder {
            parents: Vec::new(),
            local: BTreeMap::new(),
        }
    }

    /// A parentless table built from `(proxy, provider)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<ArcStr>,
        V: Into<ArcStr>,
    {
        Self::with_parents(Vec::new(), pairs)
    }

    /// A table layered over `parents`, which are consulted in order after
    /// the local `(proxy, provider)` pairs.
    pub fn with_parents<K, V>(
        parents: impl IntoIterator<Item = &'p ParamAliases<'p>>,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<ArcStr>,
        V: Into<ArcStr>,
    {
        let parents: Vec<_> = parents.into_iter().collect();
        let local: BTreeMap<ArcStr, ArcStr> = pairs
            .into_iter()
            .map(|(proxy, provider)| (proxy.into(), provider.into()))
            .filter(|(proxy, provider)| proxy != provider)
            .collect();

        let mut aliases = Self {
            parents,
            local,
            hash: 0,
        };
        aliases.hash = aliases.effective_hash();
        aliases
    }

    /// XOR over `(proxy, direct provider)` for every proxy of the hierarchy.
    /// `proxies()` is a set, so each proxy contributes exactly once.
    fn effective_hash(&self) -> u64 {
        self.proxies()
            .into_iter()
            .filter_map(|proxy| {
                let provider = self.direct_choice_for(&proxy)?;
                Some(hash_one(&(&*proxy, &*provider)))
            })
            .fold(0, |acc, entry| acc ^ entry)
    }

    /// The directly specified provider for `proxy`, looking at the local
    /// entries first and then at each parent in order.
    pub fn direct_choice_for(&self, proxy: &str) -> Option<ArcStr> {
        if let Some(provider) = self.local.get(proxy) {
            return Some(provider.clone());
        }

        self.parents
            .iter()
            .find_map(|parent| parent.direct_choice_for(proxy))
    }

    /// Follows the alias chain starting at `proxy` until the name is no
    /// longer aliased. Returns `proxy` itself if it was never aliased.
    ///
    /// # Errors
    ///
    /// Returns [`AliasError::Cycle`] if the chain revisits a name.
    pub fn choice_for(&self, proxy: &str) -> Result<ArcStr, AliasError> {
        let Some(mut choice) = self.direct_choice_for(proxy) else {
            return Ok(proxy.into());
        };

        let mut chain: Vec<ArcStr> = vec![proxy.into()];
        let mut seen: HashSet<ArcStr> = chain.iter().cloned().collect();

        loop {
            chain.push(choice.clone());

            if !seen.insert(choice.clone()) {
                return Err(AliasError::Cycle {
                    name: proxy.into(),
                    chain,
                });
            }

            match self.direct_choice_for(&choice) {
                Some(next) => choice = next,
                None => return Ok(choice),
            }
        }
    }

    /// Identity hash of the whole alias hierarchy.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Whether the table and all its parents are free of aliases.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.parents.iter().all(|parent| parent.is_empty())
    }

    /// Number of entries defined directly on this table.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Every proxy name defined on this table or any of its ancestors.
    pub fn proxies(&self) -> BTreeSet<ArcStr> {
        let mut proxies = BTreeSet::new();
        self.collect_proxies(&mut proxies);
        proxies
    }

    fn collect_proxies(&self, proxies: &mut BTreeSet<ArcStr>) {
        proxies.extend(self.local.keys().cloned());

        for parent in &self.parents {
            parent.collect_proxies(proxies);
        }
    }

    /// Flattens the whole hierarchy into a single map from every proxy to
    /// its final provider.
    ///
    /// # Errors
    ///
    /// Returns [`AliasError::Cycle`] if any chain is cyclic.
    pub fn flatten(&self) -> Result<BTreeMap<ArcStr, ArcStr>, AliasError> {
        self.proxies()
            .into_iter()
            .map(|proxy| {
                let provider = self.choice_for(&proxy)?;
                Ok((proxy, provider))
            })
            .collect()
    }

    /// Local entries, ordered by proxy name.
    pub fn local_entries(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> + '_ {
        self.local.iter()
    }
}

impl PartialEq for ParamAliases<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ParamAliases<'_> {}

impl std::hash::Hash for ParamAliases<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl std::fmt::Debug for ParamAliases<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamAliases")
            .field("local", &self.local)
            .field("parents", &self.parents)
            .finish()
    }
}

/// Incremental construction of a [`ParamAliases`] table.
pub struct ParamAliasesBuilder<'p> {
    parents: Vec<&'p ParamAliases<'p>>,
    local: BTreeMap<ArcStr, ArcStr>,
}

impl<'p> ParamAliasesBuilder<'p> {
    pub fn parent(mut self, parent: &'p ParamAliases<'p>) -> Self {
        self.parents.push(parent);
        self
    }

    /// Redirects `proxy` to `provider`. A later call for the same proxy
    /// replaces the earlier one.
    pub fn alias(mut self, proxy: impl Into<ArcStr>, provider: impl Into<ArcStr>) -> Self {
        self.local.insert(proxy.into(), provider.into());
        self
    }

    pub fn build(self) -> ParamAliases<'p> {
        ParamAliases::with_parents(self.parents, self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaliased_name_resolves_to_itself() {
        let aliases = ParamAliases::new();
        assert_eq!(aliases.choice_for("color").unwrap().as_ref(), "color");
        assert_eq!(aliases.direct_choice_for("color"), None);
        assert_eq!(aliases.hash(), 0);
    }

    #[test]
    fn test_chained_aliases() {
        let aliases = ParamAliases::from_pairs([("color", "shade"), ("shade", "phong_shade")]);

        assert_eq!(aliases.direct_choice_for("color").unwrap().as_ref(), "shade");
        assert_eq!(aliases.choice_for("color").unwrap().as_ref(), "phong_shade");
    }

    #[test]
    fn test_local_entries_shadow_parents() {
        let parent = ParamAliases::from_pairs([("a", "from_parent"), ("b", "parent_b")]);
        let child = ParamAliases::builder()
            .parent(&parent)
            .alias("a", "from_child")
            .build();

        assert_eq!(child.choice_for("a").unwrap().as_ref(), "from_child");
        assert_eq!(child.choice_for("b").unwrap().as_ref(), "parent_b");
    }

    #[test]
    fn test_parents_are_consulted_in_order() {
        let first = ParamAliases::from_pairs([("a", "first")]);
        let second = ParamAliases::from_pairs([("a", "second"), ("b", "second_b")]);
        let child = ParamAliases::with_parents([&first, &second], Vec::<(ArcStr, ArcStr)>::new());

        assert_eq!(child.choice_for("a").unwrap().as_ref(), "first");
        assert_eq!(child.choice_for("b").unwrap().as_ref(), "second_b");
    }

    #[test]
    fn test_chain_across_parents() {
        let parent = ParamAliases::from_pairs([("shade", "phong_shade")]);
        let child = ParamAliases::builder()
            .parent(&parent)
            .alias("color", "shade")
            .build();

        assert_eq!(child.choice_for("color").unwrap().as_ref(), "phong_shade");
    }

    #[test]
    fn test_cycle_is_reported() {
        let aliases = ParamAliases::from_pairs([("a", "b"), ("b", "c"), ("c", "a")]);

        let err = aliases.choice_for("a").unwrap_err();
        let AliasError::Cycle { name, chain } = err;
        assert_eq!(name.as_ref(), "a");
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.first(), chain.last());
        assert!(aliases.flatten().is_err());
    }

    #[test]
    fn test_identity_pairs_are_dropped() {
        let aliases = ParamAliases::from_pairs([("a", "a")]);
        assert!(aliases.is_empty());
        assert_eq!(aliases.hash(), ParamAliases::new().hash());
    }

    #[test]
    fn test_hash_ignores_hierarchy_and_order() {
        let flat = ParamAliases::from_pairs([("a", "x"), ("b", "y")]);
        let reversed = ParamAliases::from_pairs([("b", "y"), ("a", "x")]);
        let parent = ParamAliases::from_pairs([("a", "x")]);
        let layered = ParamAliases::builder().parent(&parent).alias("b", "y").build();
        let other = ParamAliases::from_pairs([("a", "x"), ("b", "z")]);

        assert_eq!(flat.hash(), reversed.hash());
        assert_eq!(flat.hash(), layered.hash());
        assert_ne!(flat.hash(), other.hash());
    }

    #[test]
    fn test_hash_follows_parent_order() {
        let first = ParamAliases::from_pairs([("color", "first")]);
        let second = ParamAliases::from_pairs([("color", "second")]);
        let a = ParamAliases::with_parents([&first, &second], Vec::<(ArcStr, ArcStr)>::new());
        let b = ParamAliases::with_parents([&second, &first], Vec::<(ArcStr, ArcStr)>::new());

        assert_eq!(a.choice_for("color").unwrap().as_ref(), "first");
        assert_eq!(b.choice_for("color").unwrap().as_ref(), "second");
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), first.hash());
    }

    #[test]
    fn test_hash_of_repeated_parent_entry() {
        let parent = ParamAliases::from_pairs([("color", "albedo")]);
        let child = ParamAliases::builder()
            .parent(&parent)
            .alias("color", "albedo")
            .build();

        assert_ne!(child.hash(), ParamAliases::new().hash());
        assert_eq!(child.hash(), parent.hash());
    }

    #[test]
    fn test_hash_ignores_shadowed_parent_entries() {
        let parent = ParamAliases::from_pairs([("color", "albedo")]);
        let child = ParamAliases::builder()
            .parent(&parent)
            .alias("color", "emissive")
            .build();
        let plain = ParamAliases::from_pairs([("color", "emissive")]);

        assert_eq!(child.hash(), plain.hash());
        assert_ne!(child.hash(), parent.hash());
    }

    #[test]
    fn test_flatten_and_proxies() {
        let parent = ParamAliases::from_pairs([("shade", "phong_shade")]);
        let child = ParamAliases::builder()
            .parent(&parent)
            .alias("color", "shade")
            .build();

        let flat = child.flatten().unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["color"].as_ref(), "phong_shade");
        assert_eq!(flat["shade"].as_ref(), "phong_shade");

        let proxies: Vec<_> = child.proxies().into_iter().map(|p| p.to_string()).collect();
        assert_eq!(proxies, ["color", "shade"]);
    }
}
