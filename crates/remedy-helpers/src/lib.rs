use std::hash::BuildHasherDefault;

/// Insertion-ordered map keyed with `ahash` for speed — used wherever facet
/// and aggregate results must preserve first-seen group order before an
/// explicit `ORDER BY` re-sorts them.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<ahash::AHasher>>;
pub type IndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<ahash::AHasher>>;

/// Small builder-style helper: `Thing::default().config(|t| t.field = x)`.
pub trait Config: Sized {
    fn config(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

impl<T> Config for T {}
