use std::borrow::Cow;
use std::hash::{Hash, Hasher};

use crate::core::ArcStr;

/// An opaque, comparable and nameable token standing for the type of a
/// property value.
///
/// The resolver never looks inside a value. All it needs to know is whether
/// two usages of the same property agree on its type, so a token is just the
/// full type name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeToken(Cow<'static, str>);

impl TypeToken {
    /// Token for a Rust type, named after [`std::any::type_name`].
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// Token for a type known only by name, e.g. a shading language type.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Marker type for properties that carry no value and only signal that
    /// some work has been done.
    pub fn void() -> Self {
        Self::of::<()>()
    }

    pub fn is_void(&self) -> bool {
        *self == Self::void()
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The type name without module paths, e.g. `Vec<f32>` instead of
    /// `alloc::vec::Vec<f32>`.
    pub fn short_name(&self) -> String {
        let mut short = String::with_capacity(self.0.len());
        let mut segment = String::new();

        for ch in self.0.chars() {
            if ch.is_alphanumeric() || ch == '_' || ch == ':' {
                segment.push(ch);
            } else {
                short.push_str(segment.rsplit("::").next().unwrap_or_default());
                segment.clear();
                short.push(ch);
            }
        }
        short.push_str(segment.rsplit("::").next().unwrap_or_default());

        short
    }
}

impl std::fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeToken({})", self.0)
    }
}

impl std::fmt::Display for TypeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, typed property descriptor.
///
/// Equality and hashing only consider the name, so specs can be used as
/// set/map keys. Use [`PropertySpec::same_as`] when the type has to agree as
/// well.
#[derive(Clone)]
pub struct PropertySpec {
    pub name: ArcStr,
    pub ty: TypeToken,
}

impl PropertySpec {
    pub fn new(name: impl Into<ArcStr>, ty: TypeToken) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Shorthand for a spec typed with [`TypeToken::of`].
    pub fn of<T: ?Sized + 'static>(name: impl Into<ArcStr>) -> Self {
        Self::new(name, TypeToken::of::<T>())
    }

    /// Full equality: same name and same type.
    pub fn same_as(&self, other: &PropertySpec) -> bool {
        self.name == other.name && self.ty == other.ty
    }

    /// The same spec under a different name.
    pub fn renamed(&self, name: ArcStr) -> Self {
        Self {
            name,
            ty: self.ty.clone(),
        }
    }

    /// Hash over both the name and the type token.
    pub(crate) fn structural_hash(&self) -> u64 {
        crate::core::hash_one(&(&*self.name, self.ty.name()))
    }
}

impl PartialEq for PropertySpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PropertySpec {}

impl Hash for PropertySpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Debug for PropertySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty.short_name())
    }
}
