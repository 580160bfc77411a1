use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Document, EntityKind, ID_FIELD, string_field};
use crate::error::RepoError;
use crate::schema::{self, ReferenceField};
use crate::store::{Filter, StoreAccessor};

type PathKey = (EntityKind, String);

enum Lookup {
    Inlined(Document),
    OnPath,
    Missing,
}

/// Read-side denormalizer: replaces identifier references with the documents
/// they point at, recursively. Documents already stored inline are walked the
/// same way.
///
/// Documents already on the current expansion path are left as identifiers,
/// so cyclic graphs terminate.
pub struct ReferenceExpander<'a, S: StoreAccessor + ?Sized> {
    store: &'a S,
}

impl<'a, S: StoreAccessor + ?Sized> ReferenceExpander<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns an expanded copy of `document`; the input is left untouched.
    pub fn expand(&self, kind: EntityKind, document: &Document) -> Result<Document, RepoError> {
        let mut path = HashSet::new();
        if let Some(id) = string_field(document, ID_FIELD) {
            path.insert((kind, id.to_string()));
        }
        self.expand_on_path(kind, document, &mut path)
    }

    fn expand_on_path(
        &self,
        kind: EntityKind,
        document: &Document,
        path: &mut HashSet<PathKey>,
    ) -> Result<Document, RepoError> {
        let mut expanded = document.clone();
        for field in schema::references(kind) {
            match document.get(field.name) {
                Some(Value::String(id)) => {
                    if let Lookup::Inlined(target) = self.lookup(field, id, path)? {
                        expanded.insert(field.name.to_string(), Value::Object(target));
                    }
                }
                Some(Value::Object(inline)) => {
                    if let Some(target) = self.expand_inline(field, inline, path)? {
                        expanded.insert(field.name.to_string(), Value::Object(target));
                    }
                }
                Some(Value::Array(items)) => {
                    let mut changed = false;
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(id) => match self.lookup(field, id, path)? {
                                Lookup::Inlined(target) => {
                                    changed = true;
                                    values.push(Value::Object(target));
                                }
                                Lookup::OnPath => values.push(item.clone()),
                                Lookup::Missing => {}
                            },
                            Value::Object(inline) => {
                                match self.expand_inline(field, inline, path)? {
                                    Some(target) => {
                                        changed = true;
                                        values.push(Value::Object(target));
                                    }
                                    None => values.push(item.clone()),
                                }
                            }
                            other => values.push(other.clone()),
                        }
                    }
                    if changed {
                        expanded.insert(field.name.to_string(), Value::Array(values));
                    }
                }
                _ => {}
            }
        }
        Ok(expanded)
    }

    /// Expands the references held by a document that was stored inline.
    /// Returns `None` when it is already on the expansion path.
    fn expand_inline(
        &self,
        field: &ReferenceField,
        inline: &Document,
        path: &mut HashSet<PathKey>,
    ) -> Result<Option<Document>, RepoError> {
        let Some(id) = string_field(inline, ID_FIELD) else {
            return self.expand_on_path(field.target, inline, path).map(Some);
        };
        let key = (field.target, id.to_string());
        if path.contains(&key) {
            return Ok(None);
        }
        path.insert(key.clone());
        let expanded = self.expand_on_path(field.target, inline, path);
        path.remove(&key);
        expanded.map(Some)
    }

    fn lookup(
        &self,
        field: &ReferenceField,
        id: &str,
        path: &mut HashSet<PathKey>,
    ) -> Result<Lookup, RepoError> {
        let key = (field.target, id.to_string());
        if path.contains(&key) {
            debug!(field = field.name, id, "reference cycles back onto expansion path");
            return Ok(Lookup::OnPath);
        }

        let collection = field.target.collection();
        let Some(target) = self.store.find_one(collection, &Filter::by_id(id))? else {
            warn!(id, collection, "reference not found");
            return Ok(Lookup::Missing);
        };

        path.insert(key.clone());
        let expanded = self.expand_on_path(field.target, &target, path);
        path.remove(&key);
        Ok(Lookup::Inlined(expanded?))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_field_names_are_not_followed() {
        let store = MemoryStore::new();
        store
            .insert_one("Study", doc(json!({"id": "s1", "title": "T"})))
            .unwrap();
        let sample = doc(json!({"id": "x", "has_attribute": "s1", "has_study": "s1"}));
        let expanded = ReferenceExpander::new(&store)
            .expand(EntityKind::Sample, &sample)
            .unwrap();
        assert_eq!(expanded, sample);
    }
}
