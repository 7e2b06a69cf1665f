//! Synchronizer
//!
//! Mirrors external records onto target entities. Prepare compares each
//! candidate against the entity it would touch and keeps only candidates
//! that would change something (elision). Execute writes the survivors,
//! rebuilding the target values from the stored record so that what was
//! compared is exactly what gets written.

use crate::config::schema::{EdiConfig, EntitySchema, RecordTypeConfig};
use crate::core::batch::{batched, Statistics};
use crate::core::compare::FieldComparators;
use crate::core::documents::DocumentContext;
use crate::core::entities;
use crate::core::records::{candidate_name, resolve_candidate_lookups, resolve_lookups};
use crate::domain::entity::ACTIVE_FIELD;
use crate::domain::{EdiError, Entity, EntityId, NewRecord, Record, Result};
use crate::log_batch_processing;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Target kind and schema of a synchronizer record type
fn target<'a>(config: &'a EdiConfig, record_type: &RecordTypeConfig) -> Result<(&'a str, &'a EntitySchema)> {
    let kind = record_type.target.as_deref().ok_or_else(|| {
        EdiError::Configuration(format!(
            "Record type '{}' has no target entity kind",
            record_type.name
        ))
    })?;
    let schema = config.entity(kind).ok_or_else(|| {
        EdiError::Configuration(format!("Unknown entity kind '{kind}'"))
    })?;
    Ok((schema.kind.as_str(), schema))
}

/// Values a record would write to its target
///
/// The natural key goes to the `via` field, mapped fields are copied from
/// the record, resolved lookups are carried over, and active or
/// deactivating synchronizers also set `active`, so a swept target that
/// reappears is reactivated.
pub fn target_values(
    schema: &EntitySchema,
    record_type: &RecordTypeConfig,
    values: &Map<String, Value>,
) -> Map<String, Value> {
    let mut target = Map::new();
    if let Some(name) = values.get("name") {
        target.insert(
            record_type.via.clone(),
            schema.coerce(&record_type.via, name.clone()),
        );
    }
    for (target_field, source_field) in &record_type.values {
        if let Some(value) = values.get(source_field) {
            target.insert(
                target_field.clone(),
                schema.coerce(target_field, value.clone()),
            );
        }
    }
    for lookup in &record_type.lookups {
        if let Some(id) = values.get(&lookup.target) {
            target.insert(lookup.target.clone(), id.clone());
        }
    }
    if record_type.active || record_type.deactivate {
        target.insert(ACTIVE_FIELD.to_string(), Value::Bool(true));
    }
    target
}

/// Existing targets by natural key, inactive ones included
async fn targets_by_key(
    cx: &mut DocumentContext<'_>,
    kind: &str,
    record_type: &RecordTypeConfig,
    keys: &[String],
) -> Result<HashMap<String, Entity>> {
    let mut targets = HashMap::new();
    for entity in cx
        .session
        .find_entities(kind, &record_type.via, keys, &record_type.domain)
        .await?
    {
        if let Some(key) = entity.key(&record_type.via) {
            targets.entry(key).or_insert(entity);
        }
    }
    Ok(targets)
}

/// Creates records for the candidates that would change their target
///
/// With deactivation enabled, active targets within the domain that no
/// candidate matched get a deactivation record.
pub async fn prepare(
    cx: &mut DocumentContext<'_>,
    record_type: &RecordTypeConfig,
    mut candidates: Vec<Map<String, Value>>,
) -> Result<()> {
    let config = cx.config;
    let (kind, schema) = target(config, record_type)?;
    let settings = &config.synchronizer;
    let mut comparators = FieldComparators::new(schema, settings.empty_equals_absent);
    let mut produced: Option<HashSet<(String, Option<EntityId>)>> =
        record_type.dedupe.then(HashSet::new);
    let mut matched: HashSet<EntityId> = HashSet::new();
    let mut keys: HashSet<String> = HashSet::new();

    let total = candidates.len();
    let mut count = 0usize;
    let stats = Statistics::start(&*cx.session);
    let batch_size = settings.batch_size.max(1);

    for (index, batch) in candidates.chunks_mut(batch_size).enumerate() {
        let start = index * batch_size;
        tracing::info!(
            "{} preparing {} {}-{}",
            cx.document.name,
            record_type.name,
            start,
            start + batch.len() - 1
        );
        log_batch_processing!(start, total);

        let unresolved = resolve_candidate_lookups(&mut *cx.session, record_type, batch).await?;
        let names = batch
            .iter()
            .map(|values| candidate_name(record_type, values))
            .collect::<Result<Vec<String>>>()?;
        let targets = targets_by_key(cx, kind, record_type, &names).await?;
        matched.extend(targets.values().map(|t| t.id));

        let mut new_records = Vec::new();
        for ((values, name), unresolved) in batch.iter().zip(names).zip(unresolved) {
            let target = targets.get(&name);
            if let Some(target) = target {
                let wanted = target_values(schema, record_type, values);
                if !unresolved && comparators.unchanged(&target.fields, &wanted) {
                    continue;
                }
            }
            let target_id = target.map(|t| t.id);

            if let Some(produced) = produced.as_mut() {
                if !produced.insert((serde_json::to_string(values)?, target_id)) {
                    continue;
                }
            }
            if !keys.insert(name.clone()) {
                return Err(EdiError::user(format!(
                    "{} key \"{}\" appears more than once in {}",
                    record_type.name, name, cx.document.name
                )));
            }
            new_records.push(
                NewRecord::new(&record_type.name, name, values.clone())
                    .with_target(target_id)
                    .keyed(),
            );
        }
        count += new_records.len();
        cx.session.create_records(cx.document.id, new_records).await?;
    }

    if record_type.deactivate {
        deactivate_unmatched(cx, kind, record_type, &matched, &keys).await?;
    }

    let excess = stats.count(&*cx.session).saturating_sub(count as u64);
    tracing::info!(
        "{} prepared {} elided {} of {}, {} excess queries",
        cx.document.name,
        record_type.name,
        total - count,
        total,
        excess
    );
    if excess >= total as u64 && total as u64 > settings.precache_threshold {
        tracing::warn!(
            "{} missing precaching for {}: {} records, {} excess queries",
            cx.document.name,
            record_type.name,
            total,
            excess
        );
    }
    Ok(())
}

async fn deactivate_unmatched(
    cx: &mut DocumentContext<'_>,
    kind: &str,
    record_type: &RecordTypeConfig,
    matched: &HashSet<EntityId>,
    keys: &HashSet<String>,
) -> Result<()> {
    let mut used = keys.clone();
    let unmatched: Vec<NewRecord> = cx
        .session
        .search_entities(kind, &record_type.domain)
        .await?
        .into_iter()
        .filter(|entity| entity.is_active() && !matched.contains(&entity.id))
        .map(|entity| {
            // Duplicate targets share a key, so fall back to the id
            let name = entity
                .key(&record_type.via)
                .filter(|key| used.insert(key.clone()))
                .unwrap_or_else(|| format!("#{}", entity.id));
            NewRecord::new(&record_type.name, name, Map::new())
                .with_target(Some(entity.id))
                .deactivating()
                .keyed()
        })
        .collect();
    if unmatched.is_empty() {
        return Ok(());
    }
    tracing::info!(
        "{} deactivating {} {}",
        cx.document.name,
        unmatched.len(),
        kind
    );
    cx.session.create_records(cx.document.id, unmatched).await?;
    Ok(())
}

/// Creates or updates the target of one record
///
/// Without fail-fast, a validation failure is stored on the record and the
/// record is skipped.
async fn write_target(
    cx: &mut DocumentContext<'_>,
    kind: &str,
    schema: &EntitySchema,
    record_type: &RecordTypeConfig,
    record: &mut Record,
) -> Result<()> {
    let config = cx.config;
    let values = target_values(schema, record_type, &record.values);
    let savepoint = if cx.doc_type.fail_fast {
        None
    } else {
        Some(cx.session.savepoint().await?)
    };

    let written = match record.target {
        Some(id) => entities::update(&mut *cx.session, config, id, values).await,
        None => entities::create(&mut *cx.session, config, kind, values).await,
    };

    match (written, savepoint) {
        (Ok(entity), savepoint) => {
            if let Some(savepoint) = savepoint {
                cx.session.release(savepoint).await?;
            }
            if record.target.is_none() {
                record.target = Some(entity.id);
                cx.session.update_record(record).await?;
            }
            Ok(())
        }
        (Err(EdiError::Validation(message)), Some(savepoint)) => {
            cx.session.rollback_to(savepoint).await?;
            cx.session.release(savepoint).await?;
            tracing::warn!(
                "{} failed to write {} for {}: {}",
                cx.document.name,
                kind,
                record.name,
                message
            );
            record.error = Some(message);
            cx.session.update_record(record).await
        }
        (Err(err), savepoint) => {
            if let Some(savepoint) = savepoint {
                cx.session.rollback_to(savepoint).await?;
                cx.session.release(savepoint).await?;
            }
            Err(err)
        }
    }
}

/// Writes a group of records to their targets in batches
async fn write_targets(
    cx: &mut DocumentContext<'_>,
    kind: &str,
    schema: &EntitySchema,
    record_type: &RecordTypeConfig,
    records: &mut [Record],
    verb: (&str, &str),
    offset: &mut usize,
    total: usize,
) -> Result<()> {
    let batch_size = cx.config.synchronizer.batch_size.max(1);
    for batch in records.chunks_mut(batch_size) {
        let count = batch.len();
        tracing::info!(
            "{} {} {} {}-{} of {}",
            cx.document.name,
            verb.0,
            kind,
            *offset,
            *offset + count - 1,
            total
        );
        let stats = Statistics::start(&*cx.session);
        for record in batch.iter_mut() {
            write_target(cx, kind, schema, record_type, record).await?;
        }
        tracing::info!(
            "{} {} {} {}-{} in {:.2}s, {} excess queries",
            cx.document.name,
            verb.1,
            kind,
            *offset,
            *offset + count - 1,
            stats.elapsed().as_secs_f64(),
            stats.count(&*cx.session).saturating_sub(count as u64)
        );
        *offset += count;
    }
    Ok(())
}

/// Applies the records of one synchronizer record type
pub async fn execute(cx: &mut DocumentContext<'_>, record_type: &RecordTypeConfig) -> Result<()> {
    let config = cx.config;
    let (kind, schema) = target(config, record_type)?;
    let (deactivations, mut records): (Vec<Record>, Vec<Record>) = cx
        .session
        .records(cx.document.id, &record_type.name)
        .await?
        .into_iter()
        .partition(|r| r.deactivate);

    // Targets created since prepare, possibly by an earlier record type
    let new: Vec<usize> = (0..records.len())
        .filter(|&i| records[i].target.is_none())
        .collect();
    for (range, batch) in batched(&new, config.synchronizer.batch_size) {
        tracing::info!(
            "{} rechecking {} {}-{} of {}",
            cx.document.name,
            kind,
            range.start,
            range.end - 1,
            new.len()
        );
        let names: Vec<String> = batch.iter().map(|&i| records[i].name.clone()).collect();
        let targets = targets_by_key(cx, kind, record_type, &names).await?;
        for &i in batch {
            if let Some(target) = targets.get(&records[i].name) {
                records[i].target = Some(target.id);
                cx.session.update_record(&records[i]).await?;
            }
        }
    }

    // Records whose lookups are ready go first
    let total = records.len();
    let mut offset = 0;
    let mut remaining = records;
    while !remaining.is_empty() {
        let mut ready = resolve_lookups(cx, record_type, &mut remaining, false).await?;
        if !ready.iter().any(|r| *r) {
            ready = resolve_lookups(cx, record_type, &mut remaining, true).await?;
        }
        if !ready.iter().any(|r| *r) {
            break;
        }

        let mut round = Vec::new();
        let mut rest = Vec::new();
        for (record, ready) in remaining.into_iter().zip(ready) {
            if ready {
                round.push(record);
            } else {
                rest.push(record);
            }
        }
        remaining = rest;

        let (mut existing, mut created): (Vec<Record>, Vec<Record>) =
            round.into_iter().partition(|r| r.target.is_some());
        write_targets(
            cx,
            kind,
            schema,
            record_type,
            &mut existing,
            ("updating", "updated"),
            &mut offset,
            total,
        )
        .await?;
        write_targets(
            cx,
            kind,
            schema,
            record_type,
            &mut created,
            ("creating", "created"),
            &mut offset,
            total,
        )
        .await?;
    }

    if !deactivations.is_empty() {
        let mut inactive = Map::new();
        inactive.insert(ACTIVE_FIELD.to_string(), Value::Bool(false));
        for record in &deactivations {
            if let Some(id) = record.target {
                cx.session.update_entity(id, inactive.clone()).await?;
            }
        }
        tracing::info!(
            "{} deactivated {} {}",
            cx.document.name,
            deactivations.len(),
            kind
        );
    }
    Ok(())
}
