use super::*;
use crate::checkpoint::{
    DeleteCheckpoint, DeleteStage, FileCheckpointPort, ImportCheckpoint, ImportStage,
    MemoryCheckpointPort,
};
use crate::containers;
use crate::database::open_in_memory;
use crate::error::BulkError;
use crate::inventory::{self, insert_card};
use crate::ledger::{self, BulkAllocationItem};
use crate::models::{CardStatus, ContainerEntry, NewCard, Section};
use mtg_common::{CardIdentifier, CardRecord, CatalogError, CatalogResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

// ── Test doubles ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeCatalog {
    batch: HashMap<String, CardRecord>,
    single: HashMap<String, CardRecord>,
    fail_batch: bool,
    batch_calls: Cell<usize>,
    single_calls: Cell<usize>,
}

impl FakeCatalog {
    fn knowing(names: &[(&str, &str)]) -> Self {
        let mut catalog = FakeCatalog::default();
        for (name, set) in names {
            catalog.batch.insert(name.to_lowercase(), record(name, set));
        }
        catalog
    }

    fn with_single(mut self, name: &str, set: &str) -> Self {
        self.single.insert(name.to_lowercase(), record(name, set));
        self
    }
}

fn record(name: &str, set: &str) -> CardRecord {
    CardRecord {
        scryfall_id: Some(format!("{}-{}", name.to_lowercase().replace(' ', "-"), set)),
        name: name.to_string(),
        set_code: set.to_string(),
        set_name: None,
        price: 0.5,
        image_url: Some("https://img.example/card.jpg".to_string()),
    }
}

impl CardCatalog for FakeCatalog {
    async fn resolve(
        &self,
        name_or_id: &str,
        _set_hint: Option<&str>,
    ) -> CatalogResult<Option<CardRecord>> {
        self.single_calls.set(self.single_calls.get() + 1);
        Ok(self.single.get(&name_or_id.to_lowercase()).cloned())
    }

    async fn resolve_batch(
        &self,
        identifiers: &[CardIdentifier],
    ) -> CatalogResult<HashMap<String, CardRecord>> {
        self.batch_calls.set(self.batch_calls.get() + 1);
        if self.fail_batch {
            return Err(CatalogError::HttpStatus(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(identifiers
            .iter()
            .filter_map(|id| {
                self.batch
                    .get(&id.name.to_lowercase())
                    .map(|r| (id.key(), r.clone()))
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingProgress {
    updates: RefCell<Vec<(u8, String)>>,
    completed: RefCell<Vec<String>>,
    errors: RefCell<Vec<String>>,
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, percent: u8, message: &str) {
        self.updates.borrow_mut().push((percent, message.to_string()));
    }

    fn complete(&self, message: &str) {
        self.completed.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}

type TestController = BulkOperationController<FakeCatalog, MemoryCheckpointPort>;

fn controller_with(catalog: FakeCatalog, port: MemoryCheckpointPort, config: BulkConfig) -> TestController {
    BulkOperationController::new(
        Arc::new(Mutex::new(open_in_memory().unwrap())),
        catalog,
        CheckpointStore::new(port),
        Arc::new(OperationGuard::new()),
        config,
    )
}

fn controller(catalog: FakeCatalog) -> TestController {
    controller_with(catalog, MemoryCheckpointPort::new(), BulkConfig::default())
}

fn import_report(outcome: OperationOutcome) -> ImportReport {
    match outcome {
        OperationOutcome::Completed(OperationReport::Import(report)) => report,
        other => panic!("expected completed import, got {:?}", other),
    }
}

fn delete_report(outcome: OperationOutcome) -> DeleteReport {
    match outcome {
        OperationOutcome::Completed(OperationReport::Delete(report)) => report,
        other => panic!("expected completed delete, got {:?}", other),
    }
}

const BURN_LIST: &str = "4 Lightning Bolt\n2 Counterspell\nSideboard\n1 Negate\n";

fn burn_catalog() -> FakeCatalog {
    FakeCatalog::knowing(&[
        ("Lightning Bolt", "M10"),
        ("Counterspell", "7ED"),
        ("Negate", "M20"),
    ])
}

// ── Import ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn import_without_sideboard_allocates_mainboard_only() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();
    let mut request = ImportRequest::deck("Izzet", BURN_LIST);
    request.include_sideboard = false;

    let report = import_report(ctl.start(OperationRequest::Import(request), &progress).await.unwrap());
    assert_eq!(report.entries, 2);
    assert_eq!(report.cards_saved, 2);
    assert_eq!(report.counters.allocated, 6);
    assert_eq!(report.counters.wishlisted, 0);
    assert!(!report.checkpoint_degraded);

    let conn = ctl.db().lock().await;
    let entries = containers::entries(&conn, report.container_id).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.section() == Section::Mainboard));
    assert!(entries
        .iter()
        .all(|e| matches!(e, ContainerEntry::Owned { .. })));
    assert!(ledger::verify_supply(&conn).unwrap().is_empty());
    drop(conn);

    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
    assert_eq!(progress.completed.borrow().len(), 1);
    assert_eq!(ctl.catalog.batch_calls.get(), 1);
    assert_eq!(ctl.catalog.single_calls.get(), 0);
}

#[tokio::test]
async fn import_with_sideboard_keeps_sections() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();

    let report = import_report(
        ctl.start(
            OperationRequest::Import(ImportRequest::deck("Izzet", BURN_LIST)),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(report.entries, 3);

    let conn = ctl.db().lock().await;
    let container = containers::require_container(&conn, report.container_id).unwrap();
    assert_eq!(container.stats.owned, 7);
    assert_eq!(container.stats.completion, 100.0);
    let sideboard: Vec<_> = containers::entries(&conn, report.container_id)
        .unwrap()
        .into_iter()
        .filter(|e| e.section() == Section::Sideboard)
        .collect();
    assert_eq!(sideboard.len(), 1);
    assert_eq!(sideboard[0].quantity(), 1);
}

#[tokio::test]
async fn import_uses_catalog_names_and_prices() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();
    ctl.start(
        OperationRequest::Import(ImportRequest::deck("Burn", "3 lightning bolt")),
        &progress,
    )
    .await
    .unwrap();

    let conn = ctl.db().lock().await;
    let card = inventory::find_by_identity(&conn, "Lightning Bolt", "M10", false, CardStatus::Collection)
        .unwrap()
        .unwrap();
    assert_eq!(card.name, "Lightning Bolt");
    assert_eq!(card.quantity, 3);
    assert!((card.price - 0.5).abs() < 1e-9);
    assert_eq!(card.scryfall_id.as_deref(), Some("lightning-bolt-M10"));
}

#[tokio::test]
async fn import_falls_back_to_single_lookups_then_placeholders() {
    let catalog = FakeCatalog::knowing(&[("Lightning Bolt", "M10")]).with_single("Counterspell", "7ED");
    let ctl = controller(catalog);
    let progress = RecordingProgress::default();
    let text = "4 Lightning Bolt\n2 Counterspell\n1 Mystery Card (XYZ)\nnot a card\n";

    let report = import_report(
        ctl.start(
            OperationRequest::Import(ImportRequest::deck("Mixed", text)),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(report.counters.skipped_lines, 1);
    assert_eq!(report.counters.fallback_lookups, 2);
    assert_eq!(report.counters.lookup_misses, 1);
    assert_eq!(report.counters.allocated, 7);

    let conn = ctl.db().lock().await;
    let placeholder = inventory::find_by_identity(&conn, "Mystery Card", "XYZ", false, CardStatus::Collection)
        .unwrap()
        .unwrap();
    assert_eq!(placeholder.price, 0.0);
    assert!(placeholder.scryfall_id.is_none());
}

#[tokio::test]
async fn fallback_lookups_are_bounded() {
    let config = BulkConfig {
        lookup_fallback_limit: 1,
        ..BulkConfig::default()
    };
    let ctl = controller_with(FakeCatalog::default(), MemoryCheckpointPort::new(), config);
    let progress = RecordingProgress::default();

    let report = import_report(
        ctl.start(
            OperationRequest::Import(ImportRequest::deck("Unknowns", "1 Foo\n1 Bar\n1 Baz")),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(ctl.catalog.single_calls.get(), 1);
    assert_eq!(report.counters.lookup_misses, 3);
    assert_eq!(report.cards_saved, 3);
}

#[tokio::test]
async fn failed_batch_lookup_degrades_to_single_lookups() {
    let mut catalog = FakeCatalog::default().with_single("Negate", "M20");
    catalog.fail_batch = true;
    let ctl = controller(catalog);
    let progress = RecordingProgress::default();

    let report = import_report(
        ctl.start(
            OperationRequest::Import(ImportRequest::deck("Blue", "2 Negate")),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(report.counters.lookup_misses, 0);
    assert_eq!(report.counters.allocated, 2);
}

#[tokio::test]
async fn wishlist_import_records_demand_only() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();
    let mut request = ImportRequest::deck("Wants", "4 Lightning Bolt");
    request.mode = ImportMode::Wishlist;

    let report = import_report(ctl.start(OperationRequest::Import(request), &progress).await.unwrap());
    assert_eq!(report.counters.allocated, 0);
    assert_eq!(report.counters.wishlisted, 4);

    let conn = ctl.db().lock().await;
    let stats = containers::require_container(&conn, report.container_id)
        .unwrap()
        .stats;
    assert_eq!(stats.wishlist, 4);
    assert_eq!(stats.completion, 0.0);
}

#[tokio::test]
async fn oversized_line_is_skipped_and_import_completes() {
    let ctl = controller(FakeCatalog::knowing(&[("Shock", "M19")]));
    let progress = RecordingProgress::default();
    let request = ImportRequest::deck("Huge", "4294967295 Lightning Bolt\n1 Shock\n");

    let report = import_report(ctl.start(OperationRequest::Import(request), &progress).await.unwrap());
    assert_eq!(report.entries, 1);
    assert_eq!(report.counters.skipped_lines, 1);
    assert_eq!(report.counters.allocated, 1);
    assert!(progress.errors.borrow().is_empty());
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
}

#[tokio::test]
async fn unwritable_checkpoint_at_start_removes_the_new_container() {
    let dir = tempfile::TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"x").unwrap();
    let ctl = BulkOperationController::new(
        Arc::new(Mutex::new(open_in_memory().unwrap())),
        burn_catalog(),
        CheckpointStore::new(FileCheckpointPort::new(blocker.join("checkpoints"))),
        Arc::new(OperationGuard::new()),
        BulkConfig::default(),
    );

    let result = ctl
        .start(
            OperationRequest::Import(ImportRequest::deck("Orphan", BURN_LIST)),
            &RecordingProgress::default(),
        )
        .await;
    assert!(matches!(result, Err(BulkError::FatalStageFailure(_))));

    let conn = ctl.db().lock().await;
    assert!(containers::list_containers(&conn).unwrap().is_empty());
}

#[tokio::test]
async fn import_into_blank_name_is_fatal_and_leaves_no_checkpoint() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();

    let result = ctl
        .start(
            OperationRequest::Import(ImportRequest::deck("   ", BURN_LIST)),
            &progress,
        )
        .await;
    assert!(matches!(result, Err(BulkError::FatalStageFailure(_))));
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
    assert!(!ctl.guard().is_running(OperationKind::Import));
    assert_eq!(ctl.catalog.batch_calls.get(), 0);
}

#[tokio::test]
async fn same_kind_is_rejected_while_running() {
    let ctl = controller(burn_catalog());
    let progress = RecordingProgress::default();
    let ticket = ctl.guard().try_acquire(OperationKind::Import).unwrap();

    let outcome = ctl
        .start(
            OperationRequest::Import(ImportRequest::deck("Burn", BURN_LIST)),
            &progress,
        )
        .await
        .unwrap();
    assert_eq!(outcome, OperationOutcome::Rejected);
    assert_eq!(
        ctl.resume(OperationKind::Import, &progress).await.unwrap(),
        OperationOutcome::Rejected
    );
    assert!(!ctl.abandon(OperationKind::Import).await.unwrap());

    drop(ticket);
    let outcome = ctl
        .start(
            OperationRequest::Import(ImportRequest::deck("Burn", BURN_LIST)),
            &progress,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, OperationOutcome::Completed(_)));
}

fn seed_allocation_fixture(conn: &mut Connection) -> (i64, Vec<BulkAllocationItem>) {
    let container = containers::create_container(conn, "Resume", &ContainerKind::Binder).unwrap();
    let items = (0..5)
        .map(|i| BulkAllocationItem {
            card_id: insert_card(conn, &NewCard::collection(&format!("Card {}", i), "M10", 2)).unwrap(),
            section: Section::Mainboard,
            quantity: 3,
        })
        .collect();
    (container, items)
}

#[tokio::test]
async fn resume_at_allocating_only_allocates_the_rest() {
    let config = BulkConfig {
        allocation_chunk: 2,
        ..BulkConfig::default()
    };
    let ctl = controller_with(FakeCatalog::default(), MemoryCheckpointPort::new(), config);
    let progress = RecordingProgress::default();

    let (container, items) = {
        let mut conn = ctl.db().lock().await;
        let (container, items) = seed_allocation_fixture(&mut conn);
        ledger::bulk_allocate(&mut conn, container, &items[..2], |_, _| {}).unwrap();
        (container, items)
    };

    let mut state = ImportCheckpoint::new(container, "Resume", ImportMode::Collection, true);
    state.stage = ImportStage::Allocating;
    state.total_cards = 5;
    state.current_card = 5;
    state.created_cards = items.clone();
    state.allocated_count = 2;
    state.counters.allocated = 100;
    ctl.store_checkpoint(&mut Checkpoint::Import(state)).await.unwrap();

    let report = import_report(ctl.resume(OperationKind::Import, &progress).await.unwrap());
    // Only the three remaining items add to the persisted counters
    assert_eq!(report.counters.allocated, 106);
    assert_eq!(report.counters.wishlisted, 3);
    assert_eq!(report.cards_saved, 5);
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());

    let mut reference = open_in_memory().unwrap();
    let (ref_container, ref_items) = seed_allocation_fixture(&mut reference);
    ledger::bulk_allocate(&mut reference, ref_container, &ref_items, |_, _| {}).unwrap();

    let conn = ctl.db().lock().await;
    assert_eq!(
        containers::entries(&conn, container).unwrap(),
        containers::entries(&reference, ref_container).unwrap()
    );
    assert!(ledger::verify_supply(&conn).unwrap().is_empty());
}

#[tokio::test]
async fn failed_stage_is_recorded_and_resumable() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let card = {
        let conn = ctl.db().lock().await;
        insert_card(&conn, &NewCard::collection("Shock", "M19", 2)).unwrap()
    };

    let mut state = ImportCheckpoint::new(77, "Ghost", ImportMode::Collection, true);
    state.stage = ImportStage::Allocating;
    state.total_cards = 1;
    state.current_card = 1;
    state.created_cards = vec![BulkAllocationItem {
        card_id: card,
        section: Section::Mainboard,
        quantity: 2,
    }];
    ctl.store_checkpoint(&mut Checkpoint::Import(state)).await.unwrap();

    let outcome = ctl.resume(OperationKind::Import, &progress).await.unwrap();
    assert!(matches!(
        &outcome,
        OperationOutcome::Failed { stage, .. } if stage == "allocating"
    ));
    assert_eq!(progress.errors.borrow().len(), 1);
    match ctl.checkpoint(OperationKind::Import).await.unwrap() {
        Some(Checkpoint::Import(saved)) => {
            assert_eq!(saved.stage, ImportStage::Error);
            assert_eq!(saved.failed_stage, Some(ImportStage::Allocating));
            assert!(saved.error.is_some());
        }
        other => panic!("unexpected checkpoint {:?}", other),
    }

    {
        let conn = ctl.db().lock().await;
        conn.execute(
            "INSERT INTO containers (id, name, kind, created_at) VALUES (77, 'Ghost', 'binder', 'now')",
            [],
        )
        .unwrap();
    }
    let report = import_report(ctl.resume(OperationKind::Import, &progress).await.unwrap());
    assert_eq!(report.counters.allocated, 2);
}

#[tokio::test]
async fn stripped_processing_checkpoint_cannot_resume() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let mut state = ImportCheckpoint::new(1, "Gone", ImportMode::Collection, true);
    state.stage = ImportStage::Error;
    state.failed_stage = Some(ImportStage::Processing);
    ctl.store_checkpoint(&mut Checkpoint::Import(state)).await.unwrap();

    let result = ctl.resume(OperationKind::Import, &progress).await;
    assert!(matches!(result, Err(BulkError::MissingPayload(stage)) if stage == "processing"));
    assert!(ctl.abandon(OperationKind::Import).await.unwrap());
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
}

#[tokio::test]
async fn completed_checkpoint_is_cleared_on_resume() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let mut state = ImportCheckpoint::new(1, "Done", ImportMode::Collection, true);
    state.stage = ImportStage::Complete;
    ctl.store_checkpoint(&mut Checkpoint::Import(state)).await.unwrap();

    let outcome = ctl.resume(OperationKind::Import, &progress).await.unwrap();
    assert!(matches!(outcome, OperationOutcome::Completed(_)));
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
    assert_eq!(
        ctl.resume(OperationKind::Import, &progress).await.unwrap(),
        OperationOutcome::NothingToResume
    );
}

#[tokio::test]
async fn full_checkpoint_storage_marks_report_degraded() {
    let ctl = controller_with(
        burn_catalog(),
        MemoryCheckpointPort::with_quota(64),
        BulkConfig::default(),
    );
    let progress = RecordingProgress::default();

    let report = import_report(
        ctl.start(
            OperationRequest::Import(ImportRequest::deck("Izzet", BURN_LIST)),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert!(report.checkpoint_degraded);
    assert_eq!(report.counters.allocated, 7);
    let warnings = progress
        .updates
        .borrow()
        .iter()
        .filter(|(_, m)| m.contains("storage is full"))
        .count();
    assert_eq!(warnings, 1);
    assert!(ctl.checkpoint(OperationKind::Import).await.unwrap().is_none());
}

// ── Delete ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_resumes_after_seven_of_ten() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();

    let (doomed, ids, bystander) = {
        let mut conn = ctl.db().lock().await;
        let doomed = containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap();
        let keep = containers::create_container(&conn, "Keep", &ContainerKind::Binder).unwrap();
        let ids: Vec<i64> = (0..10)
            .map(|i| insert_card(&conn, &NewCard::collection(&format!("Card {}", i), "", 1)).unwrap())
            .collect();
        for id in &ids {
            ledger::allocate(&mut conn, doomed, *id, 1, Section::Mainboard).unwrap();
        }
        let bystander = insert_card(&conn, &NewCard::collection("Bystander", "", 1)).unwrap();
        ledger::allocate(&mut conn, keep, bystander, 1, Section::Mainboard).unwrap();
        for id in &ids[..7] {
            ledger::retire_card(&mut conn, *id, Some(doomed)).unwrap();
        }
        (doomed, ids, bystander)
    };

    let mut state = DeleteCheckpoint::new(doomed, "Doomed", true, ids.clone());
    state.card_ids = ids[7..].to_vec();
    state.succeeded = 7;
    ctl.store_checkpoint(&mut Checkpoint::Delete(state)).await.unwrap();

    let report = delete_report(ctl.resume(OperationKind::Delete, &progress).await.unwrap());
    assert_eq!(report.card_count, 10);
    assert_eq!(report.succeeded, 10);
    assert_eq!(report.failed, 0);

    let conn = ctl.db().lock().await;
    for id in &ids {
        assert!(inventory::get_card(&conn, *id).unwrap().is_none());
    }
    assert!(inventory::get_card(&conn, bystander).unwrap().is_some());
    assert!(containers::get_container(&conn, doomed).unwrap().is_none());
    drop(conn);
    assert!(ctl.checkpoint(OperationKind::Delete).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_with_cards_keeps_demand_in_other_containers() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();

    let (doomed, keep) = {
        let mut conn = ctl.db().lock().await;
        let doomed = containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap();
        let keep = containers::create_container(&conn, "Keep", &ContainerKind::Binder).unwrap();
        let bolt = insert_card(&conn, &NewCard::collection("Lightning Bolt", "M10", 3)).unwrap();
        let negate = insert_card(&conn, &NewCard::collection("Negate", "M20", 1)).unwrap();
        ledger::allocate(&mut conn, doomed, bolt, 2, Section::Mainboard).unwrap();
        ledger::allocate(&mut conn, keep, bolt, 1, Section::Sideboard).unwrap();
        ledger::allocate(&mut conn, doomed, negate, 1, Section::Sideboard).unwrap();
        (doomed, keep)
    };

    let report = delete_report(
        ctl.start(
            OperationRequest::Delete(DeleteRequest {
                container_id: doomed,
                delete_cards: true,
            }),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(report.succeeded, 2);

    let conn = ctl.db().lock().await;
    assert!(containers::get_container(&conn, doomed).unwrap().is_none());
    let entries = containers::entries(&conn, keep).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(matches!(
        &entries[0],
        ContainerEntry::Wishlist { requested_quantity: 1, section: Section::Sideboard, .. }
    ));
    assert!(ledger::verify_supply(&conn).unwrap().is_empty());
}

#[tokio::test]
async fn delete_without_cards_keeps_inventory() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let (doomed, bolt) = {
        let mut conn = ctl.db().lock().await;
        let doomed = containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap();
        let bolt = insert_card(&conn, &NewCard::collection("Lightning Bolt", "M10", 3)).unwrap();
        ledger::allocate(&mut conn, doomed, bolt, 2, Section::Mainboard).unwrap();
        (doomed, bolt)
    };

    let report = delete_report(
        ctl.start(
            OperationRequest::Delete(DeleteRequest {
                container_id: doomed,
                delete_cards: false,
            }),
            &progress,
        )
        .await
        .unwrap(),
    );
    assert_eq!(report.card_count, 0);

    let conn = ctl.db().lock().await;
    assert!(containers::get_container(&conn, doomed).unwrap().is_none());
    assert_eq!(ledger::available_quantity(&conn, bolt).unwrap(), 3);
}

#[tokio::test]
async fn delete_prunes_wishlist_cards_only_that_container_wanted() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let (doomed, bolt, shared_twin) = {
        let mut conn = ctl.db().lock().await;
        let doomed = containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap();
        let keep = containers::create_container(&conn, "Keep", &ContainerKind::Binder).unwrap();
        let bolt = insert_card(&conn, &NewCard::collection("Lightning Bolt", "M10", 0)).unwrap();
        let shock = insert_card(&conn, &NewCard::collection("Shock", "M19", 0)).unwrap();
        ledger::allocate(&mut conn, doomed, bolt, 2, Section::Mainboard).unwrap();
        ledger::allocate(&mut conn, doomed, shock, 1, Section::Mainboard).unwrap();
        ledger::allocate(&mut conn, keep, shock, 1, Section::Mainboard).unwrap();
        let shared_twin =
            inventory::find_by_identity(&conn, "Shock", "M19", false, CardStatus::Wishlist)
                .unwrap()
                .unwrap()
                .id;
        (doomed, bolt, shared_twin)
    };

    delete_report(
        ctl.start(
            OperationRequest::Delete(DeleteRequest {
                container_id: doomed,
                delete_cards: false,
            }),
            &progress,
        )
        .await
        .unwrap(),
    );

    let conn = ctl.db().lock().await;
    assert!(
        inventory::find_by_identity(&conn, "Lightning Bolt", "M10", false, CardStatus::Wishlist)
            .unwrap()
            .is_none()
    );
    assert!(inventory::get_card(&conn, shared_twin).unwrap().is_some());
    assert!(inventory::get_card(&conn, bolt).unwrap().is_some());
}

#[tokio::test]
async fn delete_of_missing_container_is_fatal() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let result = ctl
        .start(
            OperationRequest::Delete(DeleteRequest {
                container_id: 404,
                delete_cards: true,
            }),
            &progress,
        )
        .await;
    assert!(matches!(result, Err(BulkError::FatalStageFailure(_))));
    assert!(ctl.checkpoint(OperationKind::Delete).await.unwrap().is_none());
}

#[tokio::test]
async fn stripped_delete_recomputes_card_ids() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let (doomed, ids) = {
        let mut conn = ctl.db().lock().await;
        let doomed = containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap();
        let ids: Vec<i64> = (0..3)
            .map(|i| insert_card(&conn, &NewCard::collection(&format!("Card {}", i), "", 1)).unwrap())
            .collect();
        for id in &ids {
            ledger::allocate(&mut conn, doomed, *id, 1, Section::Mainboard).unwrap();
        }
        (doomed, ids)
    };

    let full = Checkpoint::Delete(DeleteCheckpoint::new(doomed, "Doomed", true, ids.clone()));
    ctl.store_checkpoint(&mut full.stripped()).await.unwrap();

    let report = delete_report(ctl.resume(OperationKind::Delete, &progress).await.unwrap());
    assert_eq!(report.succeeded, 3);
    let conn = ctl.db().lock().await;
    assert_eq!(inventory::get_card_count(&conn).unwrap(), 0);
}

#[tokio::test]
async fn delete_error_resumes_at_failed_stage() {
    let ctl = controller(FakeCatalog::default());
    let progress = RecordingProgress::default();
    let doomed = {
        let conn = ctl.db().lock().await;
        containers::create_container(&conn, "Doomed", &ContainerKind::Binder).unwrap()
    };
    let mut state = DeleteCheckpoint::new(doomed, "Doomed", false, Vec::new());
    state.stage = DeleteStage::Error;
    state.failed_stage = Some(DeleteStage::DeletingDeck);
    state.error = Some("disk I/O error".to_string());
    ctl.store_checkpoint(&mut Checkpoint::Delete(state)).await.unwrap();

    let report = delete_report(ctl.resume(OperationKind::Delete, &progress).await.unwrap());
    assert_eq!(report.container_id, doomed);
    let conn = ctl.db().lock().await;
    assert!(containers::get_container(&conn, doomed).unwrap().is_none());
}

#[tokio::test]
async fn pending_lists_unfinished_operations() {
    let ctl = controller(FakeCatalog::default());
    let mut import = ImportCheckpoint::new(1, "A", ImportMode::Collection, true);
    import.stage = ImportStage::Saving;
    ctl.store_checkpoint(&mut Checkpoint::Import(import)).await.unwrap();
    ctl.store_checkpoint(&mut Checkpoint::Delete(DeleteCheckpoint::new(2, "B", true, vec![5])))
        .await
        .unwrap();

    let pending = ctl.pending().await.unwrap();
    let kinds: Vec<OperationKind> = pending.iter().map(Checkpoint::kind).collect();
    assert_eq!(kinds, vec![OperationKind::Import, OperationKind::Delete]);
}
