//! One-file import: hash check, parse, code assignment, upserts.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::codes::assign_state_codes;
use crate::error::ImportError;
use crate::postal::{parse_locations, ParsedFile};
use crate::store;
use crate::tracking::{file_hash, should_process};

/// Unique states in first-seen order and the districts under each.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LocationPlan {
    pub states: Vec<String>,
    pub districts: HashMap<String, HashSet<String>>,
}

pub fn plan_locations(parsed: &ParsedFile) -> LocationPlan {
    let mut plan = LocationPlan::default();
    for (state, district) in &parsed.rows {
        if !plan.districts.contains_key(state) {
            plan.states.push(state.clone());
        }
        plan.districts
            .entry(state.clone())
            .or_default()
            .insert(district.clone());
    }
    plan
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Imported {
        rows: usize,
        states_inserted: u64,
        districts_inserted: u64,
    },
}

#[derive(Debug, Default)]
pub struct Summary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub states_inserted: u64,
    pub districts_inserted: u64,
}

impl Summary {
    pub fn record(&mut self, outcome: &Result<FileOutcome, ImportError>) {
        match outcome {
            Ok(FileOutcome::Skipped) => self.skipped += 1,
            Ok(FileOutcome::Imported {
                states_inserted,
                districts_inserted,
                ..
            }) => {
                self.processed += 1;
                self.states_inserted += states_inserted;
                self.districts_inserted += districts_inserted;
            }
            Err(_) => self.failed += 1,
        }
    }
}

async fn write_plan(pool: &PgPool, plan: &LocationPlan) -> Result<(u64, u64), ImportError> {
    let mut tx = pool.begin().await?;

    let existing = store::existing_states(&mut tx).await?;
    let taken: HashSet<String> = existing.values().cloned().collect();
    let new_states: Vec<String> = plan
        .states
        .iter()
        .filter(|s| !existing.contains_key(*s))
        .cloned()
        .collect();
    let coded = assign_state_codes(&new_states, &taken);
    let states_inserted = store::insert_states(&mut tx, &coded).await?;

    let ids = store::state_ids(&mut tx).await?;
    let mut districts: HashSet<(i32, String)> = HashSet::new();
    for (state, names) in &plan.districts {
        match ids.get(state) {
            Some(&id) => districts.extend(names.iter().map(|d| (id, d.clone()))),
            None => warn!("State '{state}' missing after upsert; its districts are skipped"),
        }
    }
    let districts_inserted = store::insert_districts(&mut tx, &districts).await?;

    tx.commit().await?;
    Ok((states_inserted, districts_inserted))
}

pub async fn import_file(pool: &PgPool, path: &Path, force: bool) -> Result<FileOutcome, ImportError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content = tokio::fs::read(path).await.map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let hash = file_hash(&content);

    let previous = store::fetch_import(pool, &file_name).await?;
    if !should_process(previous.as_ref(), &hash, force) {
        info!("{file_name}: unchanged since last import, skipping");
        return Ok(FileOutcome::Skipped);
    }
    store::mark_processing(pool, &file_name, &hash).await?;

    let result = async {
        let parsed = parse_locations(content.as_slice())?;
        if parsed.skipped > 0 {
            debug!("{file_name}: {} incomplete rows skipped", parsed.skipped);
        }
        let plan = plan_locations(&parsed);
        let (states_inserted, districts_inserted) = write_plan(pool, &plan).await?;
        Ok::<_, ImportError>(FileOutcome::Imported {
            rows: parsed.rows.len(),
            states_inserted,
            districts_inserted,
        })
    }
    .await;

    match &result {
        Ok(FileOutcome::Imported {
            rows,
            states_inserted,
            districts_inserted,
        }) => {
            store::mark_completed(pool, &file_name, *rows).await?;
            info!(
                "{file_name}: {rows} rows, {states_inserted} new states, {districts_inserted} new districts"
            );
        }
        Ok(FileOutcome::Skipped) => {}
        Err(e) => {
            store::mark_failed(pool, &file_name, &e.to_string()).await?;
        }
    }
    result
}
