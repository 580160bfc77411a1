//! Flattening of nested submission payloads.
//!
//! Every entity embedded under a declared reference field, at any depth, is
//! lifted into an alias-keyed map and replaced in its parent by its alias.
//! Aliases are only meaningful inside one payload; [`crate::alias`] turns
//! them into generated identifiers before anything is stored.

use indexmap::IndexMap;
use serde_json::Value;

use crate::domain::{ACCESSION_FIELD, ALIAS_FIELD, Document, EntityKind};
use crate::error::RepoError;
use crate::identity::stamp_new;
use crate::schema::{self, ReferenceField};

#[derive(Debug, Clone, PartialEq)]
pub struct AliasedEntity {
    pub kind: EntityKind,
    pub document: Document,
}

/// Alias -> entity, in reference field declaration order with parents before
/// their nested children.
pub type AliasMap = IndexMap<String, AliasedEntity>;

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub root_kind: EntityKind,
    /// The root payload with embedded entities replaced by their aliases.
    pub root: Document,
    pub entities: AliasMap,
}

pub fn decompose(
    root_kind: EntityKind,
    payload: &Document,
    timestamp: &str,
) -> Result<Decomposition, RepoError> {
    let mut entities = AliasMap::new();
    let root = extract(root_kind, payload, &mut entities, timestamp)?;
    Ok(Decomposition {
        root_kind,
        root,
        entities,
    })
}

fn extract(
    kind: EntityKind,
    document: &Document,
    entities: &mut AliasMap,
    timestamp: &str,
) -> Result<Document, RepoError> {
    let mut rewritten = document.clone();
    for field in schema::references(kind) {
        match document.get(field.name) {
            Some(Value::Object(child)) => {
                let alias = register(field, child, entities, timestamp)?;
                rewritten.insert(field.name.to_string(), Value::String(alias));
            }
            Some(Value::Array(items)) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(child) => {
                            let alias = register(field, child, entities, timestamp)?;
                            values.push(Value::String(alias));
                        }
                        other => values.push(other.clone()),
                    }
                }
                rewritten.insert(field.name.to_string(), Value::Array(values));
            }
            _ => {}
        }
    }
    Ok(rewritten)
}

fn register(
    field: &ReferenceField,
    child: &Document,
    entities: &mut AliasMap,
    timestamp: &str,
) -> Result<String, RepoError> {
    let alias = child
        .get(ALIAS_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .ok_or_else(|| RepoError::MissingAlias {
            kind: field.target.to_string(),
            field: field.name.to_string(),
        })?
        .to_string();

    if entities.contains_key(&alias) {
        return Err(RepoError::DuplicateAlias(alias));
    }

    // Claim the slot before descending so the parent precedes its children.
    entities.insert(
        alias.clone(),
        AliasedEntity {
            kind: field.target,
            document: child.clone(),
        },
    );

    let mut document = extract(field.target, child, entities, timestamp)?;
    // Accessions are only ever handed out by the generator.
    document.remove(ACCESSION_FIELD);
    stamp_new(&mut document, timestamp);
    entities.insert(
        alias.clone(),
        AliasedEntity {
            kind: field.target,
            document,
        },
    );
    Ok(alias)
}
