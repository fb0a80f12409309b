use annomarket_core::db::open_db_in_memory;
use annomarket_core::{
    AccountId, AccountService, Amount, AssignmentPolicy, Catalog, DebitMode, IngestError,
    IngestRequest, ItemOutcome, Ledger, MarketConfig, MemoryBlobStore, Role,
    SettlementService, SourceFile, SqliteAccountRepository, SqliteCatalog, SqliteLedger,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use std::collections::HashSet;

fn register(conn: &Connection, username: &str, role: Role) -> AccountId {
    AccountService::new(
        SqliteAccountRepository::try_new(conn).unwrap(),
        MarketConfig::default(),
    )
    .register(username, format!("hash-{username}"), None, role)
    .unwrap()
}

fn market(annotator_count: usize) -> (Connection, AccountId, Vec<AccountId>) {
    let conn = open_db_in_memory().unwrap();
    let contributor = register(&conn, "con1", Role::Contributor);
    let annotators = (0..annotator_count)
        .map(|index| register(&conn, &format!("ano{index}"), Role::Annotator))
        .collect();
    (conn, contributor, annotators)
}

fn request(contributor: AccountId, names: &[&str], total_units: u32) -> IngestRequest {
    IngestRequest {
        contributor,
        name: "cats".to_string(),
        description: "cat pictures".to_string(),
        files: names
            .iter()
            .map(|name| SourceFile::new(*name, format!("bytes of {name}").into_bytes()))
            .collect(),
        total_value: Amount::from_units(total_units),
    }
}

fn balance(conn: &Connection, account: AccountId) -> Amount {
    SqliteLedger::try_new(conn).unwrap().balance(account).unwrap()
}

#[test]
fn ingest_splits_value_debits_and_fans_out() {
    let (mut conn, contributor, annotators) = market(4);
    let blobs = MemoryBlobStore::new();

    let report = {
        let mut service = SettlementService::new(
            &mut conn,
            MarketConfig::default(),
            StdRng::seed_from_u64(7),
        );
        service
            .ingest(
                &request(contributor, &["a.jpg", "b.jpg", "c.jpg", "d.jpg"], 40),
                &blobs,
            )
            .unwrap()
    };

    assert_eq!(report.debited, Amount::from_units(40));
    assert_eq!(report.created_count(), 4);
    assert_eq!(report.warnings().count(), 0);
    assert_eq!(blobs.len(), 4);
    assert_eq!(balance(&conn, contributor), Amount::from_units(60));

    let pool: HashSet<_> = annotators.iter().copied().collect();
    for (outcome, expected_name) in report.items.iter().zip(["a.jpg", "b.jpg", "c.jpg", "d.jpg"]) {
        match outcome {
            ItemOutcome::Created {
                file_name,
                value,
                annotators,
                ..
            } => {
                assert_eq!(file_name, expected_name);
                assert_eq!(*value, Amount::from_units(10));
                assert_eq!(annotators.len(), 3);
                let distinct: HashSet<_> = annotators.iter().copied().collect();
                assert_eq!(distinct.len(), 3);
                assert!(distinct.is_subset(&pool));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let dataset = catalog.get_dataset(report.dataset_id).unwrap().unwrap();
    assert_eq!(dataset.owner, contributor);
    assert_eq!(dataset.total_value, Amount::from_units(40));

    let items = catalog.list_items(report.dataset_id).unwrap();
    assert_eq!(items.len(), 4);
    let item_total = Amount::sum(items.iter().map(|item| &item.value)).unwrap();
    assert_eq!(item_total, dataset.total_value);
    for item in &items {
        let assignments = catalog.list_assignments(item.id).unwrap();
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|assignment| assignment.is_pending()));
        assert!(item.label.is_none());
    }
}

#[test]
fn uneven_split_gives_remainder_to_first_items() {
    let (mut conn, contributor, _) = market(1);
    let blobs = MemoryBlobStore::new();

    let report = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(1));
        service
            .ingest(&request(contributor, &["a", "b", "c"], 10), &blobs)
            .unwrap()
    };

    let values: Vec<i64> = report
        .items
        .iter()
        .map(|outcome| match outcome {
            ItemOutcome::Created { value, .. } => value.micros(),
            other => panic!("unexpected outcome: {other:?}"),
        })
        .collect();
    assert_eq!(values, vec![3_333_334, 3_333_333, 3_333_333]);
    assert_eq!(values.iter().sum::<i64>(), 10_000_000);
}

#[test]
fn insufficient_balance_aborts_without_side_effects() {
    let (mut conn, contributor, _) = market(4);
    SqliteLedger::try_new(&conn)
        .unwrap()
        .debit(contributor, Amount::from_units(80))
        .unwrap();
    let blobs = MemoryBlobStore::new();

    let err = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(1));
        service
            .ingest(&request(contributor, &["a", "b"], 50), &blobs)
            .unwrap_err()
    };

    match err {
        IngestError::InsufficientFunds { balance, requested } => {
            assert_eq!(balance, Amount::from_units(20));
            assert_eq!(requested, Amount::from_units(50));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(balance(&conn, contributor), Amount::from_units(20));
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    assert!(catalog.list_datasets(contributor).unwrap().is_empty());
}

#[test]
fn empty_annotator_pool_rolls_back_debit_and_dataset() {
    let (mut conn, contributor, _) = market(0);
    let blobs = MemoryBlobStore::new();

    let err = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(1));
        service
            .ingest(&request(contributor, &["a", "b"], 10), &blobs)
            .unwrap_err()
    };

    assert!(matches!(err, IngestError::NoAnnotatorsAvailable));
    assert_eq!(balance(&conn, contributor), Amount::from_units(100));
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    assert!(catalog.list_datasets(contributor).unwrap().is_empty());
    let item_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM items;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(item_rows, 0);
}

#[test]
fn empty_request_and_zero_value_are_rejected() {
    let (mut conn, contributor, _) = market(2);
    let blobs = MemoryBlobStore::new();
    let mut service =
        SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(1));

    assert!(matches!(
        service.ingest(&request(contributor, &[], 10), &blobs),
        Err(IngestError::EmptyDataset)
    ));
    assert!(matches!(
        service.ingest(&request(contributor, &["a"], 0), &blobs),
        Err(IngestError::InvalidValue)
    ));
    assert!(blobs.is_empty());
    assert_eq!(service.balance(contributor).unwrap(), Amount::from_units(100));
}

#[test]
fn only_contributors_can_ingest() {
    let (mut conn, _, annotators) = market(2);
    let blobs = MemoryBlobStore::new();
    let mut service =
        SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(1));

    let err = service
        .ingest(&request(annotators[0], &["a"], 1), &blobs)
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::RoleMismatch { account, expected: Role::Contributor } if account == annotators[0]
    ));

    let stranger = uuid::Uuid::new_v4();
    assert!(matches!(
        service.ingest(&request(stranger, &["a"], 1), &blobs),
        Err(IngestError::AccountNotFound(id)) if id == stranger
    ));
}

#[test]
fn failed_upload_is_reported_and_not_charged() {
    let (mut conn, contributor, _) = market(3);
    let blobs = MemoryBlobStore::new();
    blobs.fail_uploads_of("b.jpg");

    let report = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(3));
        service
            .ingest(
                &request(contributor, &["a.jpg", "b.jpg", "c.jpg", "d.jpg"], 40),
                &blobs,
            )
            .unwrap()
    };

    assert_eq!(report.created_count(), 3);
    assert!(matches!(
        &report.items[1],
        ItemOutcome::UploadFailed { file_name, .. } if file_name == "b.jpg"
    ));
    assert_eq!(report.debited, Amount::from_units(30));
    assert_eq!(balance(&conn, contributor), Amount::from_units(70));

    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let dataset = catalog.get_dataset(report.dataset_id).unwrap().unwrap();
    assert_eq!(dataset.total_value, Amount::from_units(30));
    let names: Vec<_> = catalog
        .list_items(report.dataset_id)
        .unwrap()
        .into_iter()
        .map(|item| item.file_name)
        .collect();
    assert_eq!(names, vec!["a.jpg", "c.jpg", "d.jpg"]);
}

#[test]
fn full_value_mode_charges_requested_total_despite_failures() {
    let (mut conn, contributor, _) = market(3);
    let blobs = MemoryBlobStore::new();
    blobs.fail_uploads_of("b.jpg");
    let config = MarketConfig {
        debit_mode: DebitMode::FullValue,
        ..MarketConfig::default()
    };

    let report = {
        let mut service = SettlementService::new(&mut conn, config, StdRng::seed_from_u64(3));
        service
            .ingest(
                &request(contributor, &["a.jpg", "b.jpg", "c.jpg", "d.jpg"], 40),
                &blobs,
            )
            .unwrap()
    };

    assert_eq!(report.created_count(), 3);
    assert_eq!(report.debited, Amount::from_units(40));
    assert_eq!(balance(&conn, contributor), Amount::from_units(60));
}

#[test]
fn all_uploads_failing_aborts_ingestion() {
    let (mut conn, contributor, _) = market(3);
    let blobs = MemoryBlobStore::new();
    blobs.fail_uploads_of("a");
    blobs.fail_uploads_of("b");

    let err = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(3));
        service
            .ingest(&request(contributor, &["a", "b"], 10), &blobs)
            .unwrap_err()
    };

    assert!(matches!(err, IngestError::NoItemsStored { failed_uploads: 2 }));
    assert_eq!(balance(&conn, contributor), Amount::from_units(100));
}

#[test]
fn duplicate_file_names_in_one_request_are_skipped() {
    let (mut conn, contributor, _) = market(3);
    let blobs = MemoryBlobStore::new();

    let report = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(3));
        service
            .ingest(&request(contributor, &["a", "a", "b"], 30), &blobs)
            .unwrap()
    };

    assert_eq!(report.created_count(), 2);
    assert!(matches!(
        &report.items[1],
        ItemOutcome::Skipped { file_name } if file_name == "a"
    ));
    assert_eq!(report.debited, Amount::from_units(30));
    assert_eq!(blobs.len(), 2);

    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let items = catalog.list_items(report.dataset_id).unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.value == Amount::from_units(15)));
}

#[test]
fn round_robin_policy_rotates_through_pool() {
    let (mut conn, contributor, annotators) = market(3);
    let blobs = MemoryBlobStore::new();
    let config = MarketConfig {
        assignment_policy: AssignmentPolicy::RoundRobin(2),
        ..MarketConfig::default()
    };

    let report = {
        let mut service = SettlementService::new(&mut conn, config, StdRng::seed_from_u64(0));
        service
            .ingest(&request(contributor, &["a", "b", "c"], 30), &blobs)
            .unwrap()
    };

    let selections: Vec<Vec<AccountId>> = report
        .items
        .iter()
        .map(|outcome| match outcome {
            ItemOutcome::Created { annotators, .. } => annotators.clone(),
            other => panic!("unexpected outcome: {other:?}"),
        })
        .collect();
    assert_eq!(
        selections,
        vec![
            vec![annotators[0], annotators[1]],
            vec![annotators[1], annotators[2]],
            vec![annotators[2], annotators[0]],
        ]
    );
}

#[test]
fn fan_out_larger_than_pool_assigns_everyone_once() {
    let (mut conn, contributor, annotators) = market(2);
    let blobs = MemoryBlobStore::new();

    let report = {
        let mut service =
            SettlementService::new(&mut conn, MarketConfig::default(), StdRng::seed_from_u64(9));
        service
            .ingest(&request(contributor, &["a"], 5), &blobs)
            .unwrap()
    };

    match &report.items[0] {
        ItemOutcome::Created {
            annotators: chosen, ..
        } => {
            let chosen: HashSet<_> = chosen.iter().copied().collect();
            let pool: HashSet<_> = annotators.iter().copied().collect();
            assert_eq!(chosen, pool);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn zero_fan_out_is_rejected_before_any_charge() {
    let (mut conn, contributor, _) = market(3);
    let blobs = MemoryBlobStore::new();
    let config = MarketConfig {
        assignment_policy: AssignmentPolicy::RandomK(0),
        ..MarketConfig::default()
    };

    let err = {
        let mut service = SettlementService::new(&mut conn, config, StdRng::seed_from_u64(4));
        service
            .ingest(&request(contributor, &["a.jpg"], 40), &blobs)
            .unwrap_err()
    };

    assert!(matches!(err, IngestError::InvalidFanOut));
    assert!(blobs.is_empty());
    assert_eq!(balance(&conn, contributor), Amount::from_units(100));
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    assert!(catalog.list_datasets(contributor).unwrap().is_empty());
}
