//! Records and lookup relationships
//!
//! A lookup lets a record refer to another entity by a textual key (say a
//! partner reference) and carries the resolved entity id alongside it. The
//! referenced entity may only come into existence while the same document
//! executes, so resolution is retried at execution time.

use crate::adapters::store::Session;
use crate::config::schema::{EdiConfig, LookupConfig, RecordModelKind, RecordTypeConfig};
use crate::core::batch::{batched, Statistics};
use crate::core::documents::DocumentContext;
use crate::core::{entities, synchronizer};
use crate::domain::entity::{is_truthy, key_string};
use crate::domain::{EdiError, EntityId, NewRecord, Record, Result};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Natural key of a candidate
pub fn candidate_name(record_type: &RecordTypeConfig, values: &Map<String, Value>) -> Result<String> {
    values.get("name").and_then(key_string).ok_or_else(|| {
        EdiError::user(format!("Missing name in {} record", record_type.name))
    })
}

/// Whether `values` name a lookup key that has no resolved target yet
fn needs_lookup(lookup: &LookupConfig, values: &Map<String, Value>) -> Option<String> {
    let key = values.get(&lookup.key)?;
    if !is_truthy(key) {
        return None;
    }
    match values.get(&lookup.target) {
        Some(target) if !target.is_null() => None,
        _ => key_string(key),
    }
}

/// Entity ids of `kind` by lookup key
async fn find_lookup_targets(
    session: &mut dyn Session,
    lookup: &LookupConfig,
    keys: &[String],
) -> Result<HashMap<String, EntityId>> {
    let mut found = HashMap::new();
    for entity in session
        .find_entities(&lookup.kind, &lookup.via, keys, &lookup.domain)
        .await?
    {
        if let Some(key) = entity.key(&lookup.via) {
            found.entry(key).or_insert(entity.id);
        }
    }
    Ok(found)
}

/// Fills in lookup targets on candidate values where they already exist
///
/// Returns, per candidate, whether some lookup key could not be resolved.
pub async fn resolve_candidate_lookups(
    session: &mut dyn Session,
    record_type: &RecordTypeConfig,
    candidates: &mut [Map<String, Value>],
) -> Result<Vec<bool>> {
    let mut unresolved = vec![false; candidates.len()];
    for lookup in &record_type.lookups {
        let missing: Vec<(usize, String)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, values)| needs_lookup(lookup, values).map(|key| (i, key)))
            .collect();
        if missing.is_empty() {
            continue;
        }
        let keys: Vec<String> = missing
            .iter()
            .map(|(_, key)| key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let found = find_lookup_targets(session, lookup, &keys).await?;
        for (i, key) in missing {
            match found.get(&key) {
                Some(id) => {
                    candidates[i].insert(lookup.target.clone(), Value::from(id.get()));
                }
                None => unresolved[i] = true,
            }
        }
    }
    Ok(unresolved)
}

/// Entity referenced by a lookup key that does not exist yet
async fn missing_lookup_target(
    session: &mut dyn Session,
    config: &EdiConfig,
    lookup: &LookupConfig,
    key: &str,
) -> Result<EntityId> {
    if !lookup.create {
        return Err(EdiError::user(format!(
            "Cannot identify {} \"{}\"",
            lookup.kind, key
        )));
    }
    let mut fields = lookup.domain.clone();
    fields.insert(lookup.via.clone(), Value::from(key));
    let entity = entities::create(session, config, &lookup.kind, fields).await?;
    tracing::info!(kind = %lookup.kind, key = %key, "Created lookup target");
    Ok(entity.id)
}

/// Fills in lookup targets on stored records
///
/// With `required`, a missing target is created (or reported) instead of
/// leaving the record unresolved. Returns, per record, whether all of its
/// lookups are resolved.
pub async fn resolve_lookups(
    cx: &mut DocumentContext<'_>,
    record_type: &RecordTypeConfig,
    records: &mut [Record],
    required: bool,
) -> Result<Vec<bool>> {
    let config = cx.config;
    let mut ready = vec![true; records.len()];
    for lookup in &record_type.lookups {
        let missing: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| needs_lookup(lookup, &record.values).map(|key| (i, key)))
            .collect();
        for (range, batch) in batched(&missing, config.synchronizer.batch_size) {
            tracing::info!(
                "{} recording {}.{} {}-{} of {}",
                cx.document.name,
                record_type.name,
                lookup.target,
                range.start,
                range.end - 1,
                missing.len()
            );
            let keys: Vec<String> = batch
                .iter()
                .map(|(_, key)| key.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let mut found = find_lookup_targets(&mut *cx.session, lookup, &keys).await?;
            for (i, key) in batch {
                let target = match found.get(key) {
                    Some(id) => Some(*id),
                    None if required => {
                        let id = missing_lookup_target(&mut *cx.session, config, lookup, key).await?;
                        found.insert(key.clone(), id);
                        Some(id)
                    }
                    None => None,
                };
                match target {
                    Some(id) => {
                        let record = &mut records[*i];
                        record
                            .values
                            .insert(lookup.target.clone(), Value::from(id.get()));
                        cx.session.update_record(record).await?;
                    }
                    None => ready[*i] = false,
                }
            }
        }
    }
    Ok(ready)
}

/// Stores candidates as plain records
pub async fn prepare_plain(
    cx: &mut DocumentContext<'_>,
    record_type: &RecordTypeConfig,
    candidates: Vec<Map<String, Value>>,
) -> Result<()> {
    tracing::info!("{} preparing {}", cx.document.name, record_type.name);
    let stats = Statistics::start(&*cx.session);
    let mut new_records = Vec::with_capacity(candidates.len());
    for values in candidates {
        let name = candidate_name(record_type, &values)?;
        new_records.push(NewRecord::new(&record_type.name, name, values));
    }
    let count = new_records.len() as u64;
    cx.session.create_records(cx.document.id, new_records).await?;
    tracing::info!(
        "{} prepared {} in {:.2}s, {} excess queries",
        cx.document.name,
        record_type.name,
        stats.elapsed().as_secs_f64(),
        stats.count(&*cx.session).saturating_sub(count)
    );
    Ok(())
}

/// Executes the records of one record type
pub async fn execute(cx: &mut DocumentContext<'_>, record_type: &RecordTypeConfig) -> Result<()> {
    match record_type.model {
        RecordModelKind::Sync => synchronizer::execute(cx, record_type).await,
        RecordModelKind::Plain => {
            let mut records = cx.session.records(cx.document.id, &record_type.name).await?;
            resolve_lookups(cx, record_type, &mut records, true).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup() -> LookupConfig {
        LookupConfig {
            key: "parent_ref".to_string(),
            target: "parent".to_string(),
            kind: "partner".to_string(),
            via: "ref".to_string(),
            domain: Map::new(),
            create: false,
        }
    }

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_needs_lookup() {
        let lookup = lookup();
        assert_eq!(
            needs_lookup(&lookup, &values(json!({"parent_ref": "P1"}))),
            Some("P1".to_string())
        );
        assert_eq!(needs_lookup(&lookup, &values(json!({"parent_ref": ""}))), None);
        assert_eq!(
            needs_lookup(&lookup, &values(json!({"parent_ref": "P1", "parent": 4}))),
            None
        );
        assert_eq!(needs_lookup(&lookup, &values(json!({}))), None);
    }

    #[test]
    fn test_candidate_name() {
        let record_type = RecordTypeConfig {
            name: "partner".to_string(),
            ..Default::default()
        };
        assert_eq!(
            candidate_name(&record_type, &values(json!({"name": "E"}))).unwrap(),
            "E"
        );
        let err = candidate_name(&record_type, &values(json!({"title": "Dr"}))).unwrap_err();
        assert_eq!(err.to_string(), "Missing name in partner record");
    }
}
