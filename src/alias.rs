use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::config::AliasPolicy;
use crate::decompose::AliasMap;
use crate::domain::{EntityKind, ID_FIELD, string_field};
use crate::error::RepoError;
use crate::schema::{self, ReferenceField};

/// Rewrites every alias reference between the entities of one submission
/// into the referenced entity's generated id.
pub fn resolve(mut entities: AliasMap, policy: AliasPolicy) -> Result<AliasMap, RepoError> {
    let targets: HashMap<String, (EntityKind, Value)> = entities
        .iter()
        .filter_map(|(alias, entity)| {
            string_field(&entity.document, ID_FIELD)
                .map(|id| (alias.clone(), (entity.kind, Value::String(id.to_string()))))
        })
        .collect();

    for entity in entities.values_mut() {
        for field in schema::references(entity.kind) {
            let Some(value) = entity.document.get(field.name) else {
                continue;
            };
            let linked = link_value(field, value, policy, |alias| {
                targets
                    .get(alias)
                    .filter(|(kind, _)| *kind == field.target)
                    .map(|(_, id)| id.clone())
            })?;
            if let Some(linked) = linked {
                entity.document.insert(field.name.to_string(), linked);
            }
        }
    }
    Ok(entities)
}

/// Replaces the alias string(s) held by `value` with whatever `lookup`
/// yields. Unknown aliases fail under [`AliasPolicy::Strict`]; under
/// [`AliasPolicy::Lenient`] they are dropped from arrays and nulled in
/// scalar fields. Returns `None` when `value` holds no alias at all.
pub fn link_value<F>(
    field: &ReferenceField,
    value: &Value,
    policy: AliasPolicy,
    lookup: F,
) -> Result<Option<Value>, RepoError>
where
    F: Fn(&str) -> Option<Value>,
{
    let dangling = |alias: &str| -> Result<(), RepoError> {
        match policy {
            AliasPolicy::Strict => Err(RepoError::DanglingAlias {
                alias: alias.to_string(),
                field: field.name.to_string(),
            }),
            AliasPolicy::Lenient => {
                debug!(alias, field = field.name, "dropping unresolved alias");
                Ok(())
            }
        }
    };

    match value {
        Value::String(alias) => match lookup(alias) {
            Some(linked) => Ok(Some(linked)),
            None => {
                dangling(alias)?;
                Ok(Some(Value::Null))
            }
        },
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(alias) => match lookup(alias) {
                        Some(linked) => values.push(linked),
                        None => dangling(alias)?,
                    },
                    other => values.push(other.clone()),
                }
            }
            Ok(Some(Value::Array(values)))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::decompose::decompose;
    use crate::domain::Document;

    const NOW: &str = "2022-03-01T12:30:00.000000Z";

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn aliases_become_ids() {
        let payload = doc(json!({
            "has_study": {"alias": "study-1"},
            "has_file": [{"alias": "file-1"}, {"alias": "file-2"}],
            "has_experiment": [{
                "alias": "exp-1",
                "has_study": "study-1",
                "has_file": ["file-1", "file-2"]
            }]
        }));
        let decomposition = decompose(EntityKind::Submission, &payload, NOW).unwrap();
        let entities = resolve(decomposition.entities, AliasPolicy::Strict).unwrap();

        let study_id = entities["study-1"].document[ID_FIELD].clone();
        let experiment = &entities["exp-1"].document;
        assert_eq!(experiment["has_study"], study_id);
        assert_eq!(
            experiment["has_file"],
            json!([
                entities["file-1"].document[ID_FIELD],
                entities["file-2"].document[ID_FIELD]
            ])
        );
    }

    #[test]
    fn dangling_alias_strict_vs_lenient() {
        let payload = doc(json!({
            "has_experiment": [{
                "alias": "exp-1",
                "has_study": "nowhere",
                "has_file": ["missing"]
            }]
        }));
        let decomposition = decompose(EntityKind::Submission, &payload, NOW).unwrap();

        let err = resolve(decomposition.entities.clone(), AliasPolicy::Strict).unwrap_err();
        assert_matches!(err, RepoError::DanglingAlias { .. });

        let entities = resolve(decomposition.entities, AliasPolicy::Lenient).unwrap();
        let experiment = &entities["exp-1"].document;
        assert_eq!(experiment["has_study"], Value::Null);
        assert_eq!(experiment["has_file"], json!([]));
    }

    #[test]
    fn alias_of_wrong_kind_does_not_link() {
        let payload = doc(json!({
            "has_file": [{"alias": "f"}],
            "has_experiment": [{"alias": "e", "has_study": "f"}]
        }));
        let decomposition = decompose(EntityKind::Submission, &payload, NOW).unwrap();
        let err = resolve(decomposition.entities, AliasPolicy::Strict).unwrap_err();
        assert_matches!(err, RepoError::DanglingAlias { alias, .. } if alias == "f");
    }
}
