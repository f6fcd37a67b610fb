use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::db::SlotStorage;
use crate::error::{StoreError, StoreResult};
use crate::models::{ApplicationRecord, NewApplication, Stage, StageFilter, Summary, NOTES_PLACEHOLDER};

pub const DEFAULT_SLOT: &str = "applications";

/// The in-memory collection of applications and its persisted mirror.
///
/// Every mutation rewrites the whole slot before the in-memory collection
/// changes, so a failed write leaves both sides as they were.
pub struct ApplicationStore<S: SlotStorage> {
    storage: S,
    slot: String,
    records: Vec<ApplicationRecord>,
}

impl<S: SlotStorage> ApplicationStore<S> {
    pub fn load(storage: S) -> Self {
        Self::load_slot(storage, DEFAULT_SLOT)
    }

    /// Reads the slot once. Missing or unreadable data starts an empty
    /// collection instead of failing.
    pub fn load_slot(storage: S, slot: &str) -> Self {
        let mut records = match storage.get(slot) {
            Ok(Some(blob)) => match serde_json::from_str::<Vec<ApplicationRecord>>(&blob) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(slot, error = %e, "ignoring unreadable application data");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(slot, error = %e, "failed to read application data");
                Vec::new()
            }
        };
        drop_duplicate_ids(&mut records, slot);
        tracing::debug!(slot, count = records.len(), "loaded applications");

        Self {
            storage,
            slot: slot.to_string(),
            records,
        }
    }

    #[cfg(test)]
    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[cfg(test)]
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn add(&mut self, draft: NewApplication) -> StoreResult<ApplicationRecord> {
        let now = chrono::Utc::now().timestamp_millis();
        self.add_at(draft, now)
    }

    fn add_at(&mut self, draft: NewApplication, now_ms: i64) -> StoreResult<ApplicationRecord> {
        draft.validate()?;

        let company = draft.company.trim();
        let role = draft.role.trim();
        let notes = draft.notes.trim();
        let record = ApplicationRecord {
            id: self.next_id(now_ms)?,
            company: company.to_string(),
            role: role.to_string(),
            stage: draft.stage,
            result: draft.result.trim().to_string(),
            date: draft.date,
            notes: if notes.is_empty() {
                NOTES_PLACEHOLDER.to_string()
            } else {
                notes.to_string()
            },
        };

        let mut next = self.records.clone();
        next.push(record.clone());
        self.commit(next)?;

        tracing::info!(id = record.id, company = %record.company, "application added");
        Ok(record)
    }

    /// Clock-based id, bumped past the largest live id when the clock has
    /// not moved on.
    fn next_id(&self, now_ms: i64) -> StoreResult<i64> {
        match self.records.iter().map(|r| r.id).max() {
            Some(max) if now_ms <= max => max
                .checked_add(1)
                .ok_or_else(|| StoreError::InvalidRecord(format!("no id left after {}", max))),
            _ => Ok(now_ms),
        }
    }

    /// Removes the record with `id`. Absent ids are not an error.
    pub fn remove(&mut self, id: i64) -> StoreResult<Option<ApplicationRecord>> {
        let Some(index) = self.records.iter().position(|r| r.id == id) else {
            tracing::debug!(id, "remove: no such application");
            self.persist()?;
            return Ok(None);
        };

        let mut next = self.records.clone();
        let removed = next.remove(index);
        self.commit(next)?;

        tracing::info!(id, "application removed");
        Ok(Some(removed))
    }

    pub fn find_by_id(&self, id: i64) -> Option<&ApplicationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Starts an edit: the record is removed right away and handed back as a
    /// draft for the caller to resubmit through [`add`](Self::add).
    pub fn take_for_edit(&mut self, id: i64) -> StoreResult<Option<NewApplication>> {
        if self.find_by_id(id).is_none() {
            return Ok(None);
        }
        Ok(self.remove(id)?.map(NewApplication::from))
    }

    /// Records matching the stage filter and, when non-empty, the search text
    /// (case-insensitive, against company or role). The search text is used
    /// as typed, whitespace included. Keeps insertion order.
    pub fn query<'a>(
        &'a self,
        filter: &'a StageFilter,
        search: &str,
    ) -> impl Iterator<Item = &'a ApplicationRecord> {
        let needle = search.to_lowercase();
        self.records
            .iter()
            .filter(move |r| filter.matches(&r.stage) && r.matches_search(&needle))
    }

    pub fn summary(&self) -> Summary {
        let count = |stage: Stage| self.records.iter().filter(|r| r.stage == stage).count();

        let total = self.records.len();
        let offers = count(Stage::Offer);
        let success_rate = if total == 0 {
            0
        } else {
            // round(offers / total * 100) with halves going up
            ((offers * 200 + total) / (2 * total)) as u32
        };

        Summary {
            total,
            interviews: count(Stage::Interview),
            offers,
            rejected: count(Stage::Rejected),
            success_rate,
        }
    }

    /// Pretty-printed JSON of the whole collection.
    pub fn export_snapshot(&self) -> StoreResult<String> {
        if self.records.is_empty() {
            return Err(StoreError::EmptyExport);
        }
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Writes the snapshot to `placement-tracker-<date>.json` under `dir`.
    pub fn export_to_dir(&self, dir: &Path, today: NaiveDate) -> StoreResult<PathBuf> {
        let snapshot = self.export_snapshot()?;
        let path = dir.join(export_file_name(today));
        std::fs::write(&path, snapshot)?;
        tracing::info!(path = %path.display(), count = self.records.len(), "exported applications");
        Ok(path)
    }

    /// Overwrites the slot with the current collection.
    pub fn persist(&mut self) -> StoreResult<()> {
        let blob = serde_json::to_string(&self.records)?;
        self.storage.set(&self.slot, &blob)
    }

    fn commit(&mut self, next: Vec<ApplicationRecord>) -> StoreResult<()> {
        let blob = serde_json::to_string(&next)?;
        if let Err(e) = self.storage.set(&self.slot, &blob) {
            tracing::error!(slot = %self.slot, error = %e, "failed to save applications");
            return Err(e);
        }
        self.records = next;
        Ok(())
    }
}

/// Keeps the first record for each id so ids stay unique whatever the slot
/// held.
fn drop_duplicate_ids(records: &mut Vec<ApplicationRecord>, slot: &str) {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.id));
    let dropped = before - records.len();
    if dropped > 0 {
        tracing::warn!(slot, dropped, "dropped applications with duplicate ids");
    }
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("placement-tracker-{}.json", today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryStorage};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn acme() -> NewApplication {
        NewApplication::new("Acme", "Backend Engineer", Stage::Applied, day(2025, 3, 1))
    }

    fn globex() -> NewApplication {
        NewApplication::new("Globex", "Data Analyst", Stage::Offer, day(2025, 3, 2))
    }

    fn ids<'a>(records: impl Iterator<Item = &'a ApplicationRecord>) -> Vec<i64> {
        records.map(|r| r.id).collect()
    }

    #[test]
    fn test_load_missing_slot_is_empty() {
        let store = ApplicationStore::load(MemoryStorage::new());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_slot_is_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(DEFAULT_SLOT, "{not json").unwrap();
        let store = ApplicationStore::load(storage);
        assert!(store.is_empty());

        let mut storage = MemoryStorage::new();
        storage.set(DEFAULT_SLOT, r#"{"foreign": true}"#).unwrap();
        assert!(ApplicationStore::load(storage).is_empty());
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        // Same clock reading for every add
        for i in 0..20 {
            store.add_at(NewApplication::new(&format!("Co {}", i), "Role", Stage::Applied, day(2025, 1, 1)), 1000).unwrap();
        }
        let mut seen: Vec<i64> = store.records().iter().map(|r| r.id).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_ids_unique_after_clock_goes_backwards() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add_at(acme(), 5000).unwrap();
        let b = store.add_at(globex(), 10).unwrap();
        assert_eq!(a.id, 5000);
        assert_eq!(b.id, 5001);
    }

    #[test]
    fn test_add_after_largest_possible_id_is_rejected() {
        let mut storage = MemoryStorage::new();
        let blob = format!(
            r#"[{{"id":{},"company":"Acme","role":"SRE","stage":"Applied","result":"Pending","date":"2025-01-01","notes":"—"}}]"#,
            i64::MAX
        );
        storage.set(DEFAULT_SLOT, &blob).unwrap();
        let mut store = ApplicationStore::load(storage);
        assert_eq!(store.len(), 1);

        let err = store.add(globex()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.storage().get(DEFAULT_SLOT).unwrap(), Some(blob));
    }

    #[test]
    fn test_load_drops_duplicate_ids() {
        let mut storage = MemoryStorage::new();
        storage
            .set(
                DEFAULT_SLOT,
                r#"[
                    {"id":7,"company":"Acme","role":"SRE","stage":"Applied","result":"Pending","date":"2025-01-01","notes":"—"},
                    {"id":8,"company":"Globex","role":"Analyst","stage":"Offer","result":"Selected","date":"2025-01-02","notes":"—"},
                    {"id":7,"company":"Initech","role":"QA","stage":"Rejected","result":"Rejected","date":"2025-01-03","notes":"—"}
                ]"#,
            )
            .unwrap();

        let store = ApplicationStore::load(storage);
        let companies: Vec<&str> = store.records().iter().map(|r| r.company.as_str()).collect();
        assert_eq!(companies, vec!["Acme", "Globex"]);
        assert_eq!(store.find_by_id(7).map(|r| r.company.as_str()), Some("Acme"));
    }

    #[test]
    fn test_add_appends_and_persists() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme()).unwrap();
        let b = store.add(globex()).unwrap();

        assert_eq!(ids(store.records().iter()), vec![a.id, b.id]);
        let blob = store.storage().get(DEFAULT_SLOT).unwrap().unwrap();
        let persisted: Vec<ApplicationRecord> = serde_json::from_str(&blob).unwrap();
        assert_eq!(persisted, store.records());
    }

    #[test]
    fn test_add_trims_and_normalizes_notes() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let record = store
            .add(NewApplication::new("  Acme ", " Engineer ", Stage::Applied, day(2025, 1, 1)).with_notes("   "))
            .unwrap();
        assert_eq!(record.company, "Acme");
        assert_eq!(record.role, "Engineer");
        assert_eq!(record.notes, NOTES_PLACEHOLDER);

        let record = store.add(globex().with_notes(" referral ")).unwrap();
        assert_eq!(record.notes, "referral");
    }

    #[test]
    fn test_add_rejects_blank_company_or_role() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let err = store
            .add(NewApplication::new("   ", "Engineer", Stage::Applied, day(2025, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));

        let err = store
            .add(NewApplication::new("Acme", "", Stage::Applied, day(2025, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_failure_is_reported_and_nothing_changes() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme()).unwrap();

        store.storage_mut().fail_writes(true);
        let err = store.add(globex()).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(ids(store.records().iter()), vec![a.id]);

        assert!(store.remove(a.id).is_err());
        assert!(store.find_by_id(a.id).is_some());
    }

    #[test]
    fn test_remove_then_find_is_absent() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme()).unwrap();

        let removed = store.remove(a.id).unwrap();
        assert_eq!(removed.map(|r| r.id), Some(a.id));
        assert!(store.find_by_id(a.id).is_none());

        // Unknown id is a no-op
        assert_eq!(store.remove(424242).unwrap(), None);
        assert!(store.find_by_id(424242).is_none());
    }

    #[test]
    fn test_query_all_preserves_insertion_order() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme()).unwrap();
        let b = store.add(globex()).unwrap();
        let c = store
            .add(NewApplication::new("Initech", "QA", Stage::Rejected, day(2024, 12, 1)))
            .unwrap();

        let all = StageFilter::All;
        assert_eq!(ids(store.query(&all, "")), vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_query_combines_stage_and_search() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        store.add(acme()).unwrap();
        let b = store.add(globex()).unwrap();
        let c = store
            .add(NewApplication::new("Acme Labs", "Analyst", Stage::Offer, day(2025, 2, 1)))
            .unwrap();

        let offers = StageFilter::Only(Stage::Offer);
        assert_eq!(ids(store.query(&offers, "")), vec![b.id, c.id]);
        assert_eq!(ids(store.query(&offers, "ACME")), vec![c.id]);
        // Matches on role too
        assert_eq!(ids(store.query(&offers, "analyst")), vec![b.id, c.id]);

        let interviews = StageFilter::Only(Stage::Interview);
        assert_eq!(store.query(&interviews, "").count(), 0);

        // Same arguments, same answer
        assert_eq!(ids(store.query(&offers, "acme")), ids(store.query(&offers, "acme")));
    }

    #[test]
    fn test_query_search_keeps_whitespace() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        store
            .add(NewApplication::new("Acme", "SRE", Stage::Applied, day(2025, 1, 1)))
            .unwrap();
        let globex = store
            .add(NewApplication::new("Globex Corp", "Analyst", Stage::Applied, day(2025, 1, 2)))
            .unwrap();

        let all = StageFilter::All;
        // A lone space is a real search, not an empty one
        assert_eq!(ids(store.query(&all, " ")), vec![globex.id]);
        assert_eq!(store.query(&all, "acme ").count(), 0);
        assert_eq!(ids(store.query(&all, "globex ")), vec![globex.id]);
    }

    #[test]
    fn test_query_custom_stage() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let oa = store
            .add(NewApplication::new("Hooli", "SRE", Stage::from("Online Assessment"), day(2025, 1, 1)))
            .unwrap();
        store.add(acme()).unwrap();

        let filter = StageFilter::from("Online Assessment");
        assert_eq!(ids(store.query(&filter, "")), vec![oa.id]);
    }

    #[test]
    fn test_summary_empty() {
        let store = ApplicationStore::load(MemoryStorage::new());
        assert_eq!(store.summary(), Summary::default());
    }

    #[test]
    fn test_acme_globex_scenario() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme()).unwrap();
        let b = store.add(globex()).unwrap();

        assert_eq!(
            store.summary(),
            Summary {
                total: 2,
                interviews: 0,
                offers: 1,
                rejected: 0,
                success_rate: 50,
            }
        );

        let all = StageFilter::All;
        assert_eq!(ids(store.query(&all, "acme")), vec![a.id]);

        store.remove(a.id).unwrap();
        assert_eq!(ids(store.query(&all, "")), vec![b.id]);
        assert_eq!(store.summary().total, 1);
    }

    #[test]
    fn test_success_rate_rounds() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        store.add(globex()).unwrap();
        store.add(acme()).unwrap();
        store.add(acme()).unwrap();
        // 1/3 -> 33
        assert_eq!(store.summary().success_rate, 33);

        store.add(globex()).unwrap();
        store.add(globex()).unwrap();
        store.add(acme()).unwrap();
        store.add(acme()).unwrap();
        store.add(acme()).unwrap();
        // 3/8 = 37.5 -> 38
        assert_eq!(store.summary().success_rate, 38);
    }

    #[test]
    fn test_take_for_edit_removes_immediately() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        let a = store.add(acme().with_notes("recruiter call")).unwrap();
        let b = store.add(globex()).unwrap();

        let draft = store.take_for_edit(a.id).unwrap().unwrap();
        assert_eq!(draft.company, "Acme");
        assert_eq!(draft.notes, "recruiter call");
        assert!(store.find_by_id(a.id).is_none());

        // Abandoning the edit leaves the record gone, even after reload
        let reloaded = ApplicationStore::load(store.storage().clone());
        assert_eq!(ids(reloaded.records().iter()), vec![b.id]);

        let resubmitted = store.add(draft).unwrap();
        assert_ne!(resubmitted.id, a.id);
        assert_eq!(ids(store.records().iter()), vec![b.id, resubmitted.id]);
    }

    #[test]
    fn test_take_for_edit_missing_is_none() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        assert!(store.take_for_edit(7).unwrap().is_none());
    }

    #[test]
    fn test_export_empty_is_rejected() {
        let store = ApplicationStore::load(MemoryStorage::new());
        assert!(matches!(store.export_snapshot(), Err(StoreError::EmptyExport)));

        let dir = tempfile::tempdir().unwrap();
        let result = store.export_to_dir(dir.path(), day(2025, 3, 5));
        assert!(matches!(result, Err(StoreError::EmptyExport)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_export_round_trips() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        store.add(acme()).unwrap();

        let snapshot = store.export_snapshot().unwrap();
        assert!(snapshot.contains("\n  {"));
        let parsed: Vec<ApplicationRecord> = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed, store.records());
    }

    #[test]
    fn test_export_to_dir_names_file_by_date() {
        let mut store = ApplicationStore::load(MemoryStorage::new());
        store.add(acme()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = store.export_to_dir(dir.path(), day(2026, 10, 16)).unwrap();
        assert_eq!(path.file_name().unwrap(), "placement-tracker-2026-10-16.json");

        let parsed: Vec<ApplicationRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_persist_and_reload_from_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.db");

        let expected = {
            let mut store = ApplicationStore::load(Database::open(&path).unwrap());
            store.add(acme()).unwrap();
            store.add(globex().with_notes("signed")).unwrap();
            store
                .add(NewApplication::new("Hooli", "SRE", Stage::from("HR Round"), day(2025, 4, 1)))
                .unwrap();
            store.persist().unwrap();
            store.records().to_vec()
        };

        let reloaded = ApplicationStore::load(Database::open(&path).unwrap());
        assert_eq!(reloaded.records(), expected.as_slice());
    }

    #[test]
    fn test_separate_slots_do_not_share_records() {
        let mut storage = MemoryStorage::new();
        {
            let mut store = ApplicationStore::load_slot(storage.clone(), "other");
            store.add(acme()).unwrap();
            storage = store.storage().clone();
        }
        assert!(ApplicationStore::load(storage.clone()).is_empty());
        assert_eq!(ApplicationStore::load_slot(storage, "other").len(), 1);
    }
}
