use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::error::{Result, SigilError};
use crate::sigil::{Category, Sigil, SourceKind};

/// Index shared between threads. Writers take the lock one at a time;
/// sigils themselves are immutable, so readers never race a mutation.
pub type SharedSigilIndex = Arc<RwLock<SigilIndex>>;

/// Authoritative in-memory collection of sigils with secondary indexes.
///
/// Sigils are kept in insertion order. Every sigil sits in exactly one
/// category bucket and one source-kind bucket; the external-tag index maps
/// `tags.linked_entity_id` back to sigil ids.
#[derive(Debug, Default)]
pub struct SigilIndex {
    sigils: Vec<Sigil>,
    position: HashMap<Uuid, usize>,
    by_category: HashMap<Category, Vec<Uuid>>,
    by_source_kind: HashMap<SourceKind, Vec<Uuid>>,
    by_external: HashMap<String, Vec<Uuid>>,
}

impl SigilIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from stored sigils, keeping their order.
    pub fn from_sigils(sigils: impl IntoIterator<Item = Sigil>) -> Result<Self> {
        let mut index = Self::new();
        for sigil in sigils {
            index.insert(sigil)?;
        }
        Ok(index)
    }

    pub fn into_shared(self) -> SharedSigilIndex {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.sigils.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigils.is_empty()
    }

    /// Insert a sigil under all indexes. Rejects an id that is already present.
    pub fn insert(&mut self, sigil: Sigil) -> Result<Uuid> {
        let id = sigil.id();
        if self.position.contains_key(&id) {
            return Err(SigilError::DuplicateSigil(id));
        }

        self.by_category.entry(sigil.category()).or_default().push(id);
        self.by_source_kind
            .entry(sigil.source_kind())
            .or_default()
            .push(id);
        if let Some(external) = &sigil.tags().linked_entity_id {
            self.by_external.entry(external.clone()).or_default().push(id);
        }
        self.position.insert(id, self.sigils.len());
        self.sigils.push(sigil);
        Ok(id)
    }

    /// Remove a sigil from every index and return it.
    pub fn remove(&mut self, id: Uuid) -> Result<Sigil> {
        let pos = self
            .position
            .remove(&id)
            .ok_or(SigilError::UnknownSigil(id))?;
        let sigil = self.sigils.remove(pos);

        detach(&mut self.by_category, &sigil.category(), id);
        detach(&mut self.by_source_kind, &sigil.source_kind(), id);
        if let Some(external) = &sigil.tags().linked_entity_id {
            detach(&mut self.by_external, external, id);
        }
        for (i, s) in self.sigils.iter().enumerate().skip(pos) {
            self.position.insert(s.id(), i);
        }
        Ok(sigil)
    }

    pub fn get(&self, id: Uuid) -> Option<&Sigil> {
        self.position.get(&id).map(|&i| &self.sigils[i])
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.position.contains_key(&id)
    }

    /// All sigils in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Sigil> {
        self.sigils.iter()
    }

    pub fn as_slice(&self) -> &[Sigil] {
        &self.sigils
    }

    pub fn by_source_kind(&self, kind: SourceKind) -> Vec<&Sigil> {
        self.resolve(self.by_source_kind.get(&kind))
    }

    pub fn by_category(&self, category: Category) -> Vec<&Sigil> {
        self.resolve(self.by_category.get(&category))
    }

    /// Sigils whose `linked_entity_id` tag equals `external_id`.
    pub fn find_by_external_tag(&self, external_id: &str) -> Vec<&Sigil> {
        self.resolve(self.by_external.get(external_id))
    }

    /// Look up several ids at once, failing on the first unknown one.
    pub fn get_many(&self, ids: &[Uuid]) -> Result<Vec<&Sigil>> {
        ids.iter()
            .map(|&id| self.get(id).ok_or(SigilError::UnknownSigil(id)))
            .collect()
    }

    /// Bucket sizes per category, in ordinal order.
    pub fn category_counts(&self) -> Vec<(Category, usize)> {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.by_category.get(&c).map_or(0, Vec::len)))
            .collect()
    }

    /// Bucket sizes per source kind, in ordinal order.
    pub fn source_kind_counts(&self) -> Vec<(SourceKind, usize)> {
        SourceKind::ALL
            .into_iter()
            .map(|k| (k, self.by_source_kind.get(&k).map_or(0, Vec::len)))
            .collect()
    }

    fn resolve(&self, ids: Option<&Vec<Uuid>>) -> Vec<&Sigil> {
        ids.map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }
}

fn detach<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Vec<Uuid>>, key: &K, id: Uuid) {
    if let Some(ids) = map.get_mut(key) {
        ids.retain(|x| *x != id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}
