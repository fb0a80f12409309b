use annomarket_core::db::open_db_in_memory;
use annomarket_core::{
    AccountId, AccountRepository, AddItemOutcome, Amount, Catalog, ContentRef, DatasetStatus,
    Grade, NewAccount, RepoError, Role, SqliteAccountRepository, SqliteCatalog,
};
use rusqlite::Connection;

fn account(conn: &Connection, username: &str, role: Role) -> AccountId {
    SqliteAccountRepository::try_new(conn)
        .unwrap()
        .create_account(&NewAccount {
            username: username.to_string(),
            password_hash: "h".to_string(),
            email: None,
            role,
            opening_balance: Amount::ZERO,
        })
        .unwrap()
}

#[test]
fn add_item_skips_existing_file_name_within_dataset() {
    let conn = open_db_in_memory().unwrap();
    let owner = account(&conn, "con1", Role::Contributor);
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let first = catalog
        .create_dataset(owner, "a", "", Amount::from_units(2))
        .unwrap();
    let second = catalog
        .create_dataset(owner, "b", "", Amount::from_units(2))
        .unwrap();
    let content = ContentRef::new("ref-1");

    let created = catalog
        .add_item(first, "x.txt", &content, Amount::from_units(1))
        .unwrap();
    assert!(matches!(created, AddItemOutcome::Created(_)));
    assert_eq!(
        catalog
            .add_item(first, "x.txt", &content, Amount::from_units(1))
            .unwrap(),
        AddItemOutcome::Skipped
    );
    assert!(matches!(
        catalog
            .add_item(second, "x.txt", &content, Amount::from_units(1))
            .unwrap(),
        AddItemOutcome::Created(_)
    ));
    assert_eq!(catalog.list_items(first).unwrap().len(), 1);
}

#[test]
fn duplicate_assignment_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let owner = account(&conn, "con1", Role::Contributor);
    let annotator = account(&conn, "ano1", Role::Annotator);
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let dataset = catalog
        .create_dataset(owner, "a", "", Amount::from_units(1))
        .unwrap();
    let AddItemOutcome::Created(item) = catalog
        .add_item(dataset, "x", &ContentRef::new("r"), Amount::from_units(1))
        .unwrap()
    else {
        panic!("item should be created");
    };

    catalog.create_assignment(item, annotator).unwrap();
    let err = catalog.create_assignment(item, annotator).unwrap_err();
    assert!(matches!(
        err,
        RepoError::DuplicateAssignment { item: failed_item, annotator: failed_annotator }
            if failed_item == item && failed_annotator == annotator
    ));
    assert_eq!(catalog.list_assignments(item).unwrap().len(), 1);
}

#[test]
fn complete_assignment_transitions_only_once() {
    let conn = open_db_in_memory().unwrap();
    let owner = account(&conn, "con1", Role::Contributor);
    let annotator = account(&conn, "ano1", Role::Annotator);
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let dataset = catalog
        .create_dataset(owner, "a", "", Amount::from_units(1))
        .unwrap();
    let AddItemOutcome::Created(item) = catalog
        .add_item(dataset, "x", &ContentRef::new("r"), Amount::from_units(1))
        .unwrap()
    else {
        panic!("item should be created");
    };
    let assignment = catalog.create_assignment(item, annotator).unwrap();
    let grade = Grade::new(4).unwrap();

    assert!(!catalog
        .attach_result(assignment, annotator, &ContentRef::new("early"))
        .unwrap());

    assert!(!catalog
        .complete_assignment(assignment, owner, grade, 1_000)
        .unwrap());
    assert!(catalog
        .complete_assignment(assignment, annotator, grade, 1_000)
        .unwrap());
    assert!(!catalog
        .complete_assignment(assignment, annotator, grade, 2_000)
        .unwrap());

    let output = ContentRef::new("out-1");
    assert!(!catalog.attach_result(assignment, owner, &output).unwrap());
    assert!(catalog.attach_result(assignment, annotator, &output).unwrap());
    assert!(!catalog
        .attach_result(assignment, annotator, &ContentRef::new("out-2"))
        .unwrap());

    let stored = catalog.get_assignment(assignment).unwrap().unwrap();
    assert_eq!(stored.result_ref, Some(output));
    assert_eq!(stored.grade, Some(grade));
    assert_eq!(stored.completed_at, Some(1_000));
    assert!(catalog.list_pending_for(annotator).unwrap().is_empty());
    assert_eq!(
        catalog.refresh_dataset_status(dataset).unwrap(),
        DatasetStatus::Completed
    );
}

#[test]
fn dataset_without_assignments_stays_pending() {
    let conn = open_db_in_memory().unwrap();
    let owner = account(&conn, "con1", Role::Contributor);
    let catalog = SqliteCatalog::try_new(&conn).unwrap();
    let dataset = catalog
        .create_dataset(owner, "empty", "", Amount::from_units(1))
        .unwrap();

    assert_eq!(
        catalog.refresh_dataset_status(dataset).unwrap(),
        DatasetStatus::Pending
    );
    assert!(matches!(
        catalog.refresh_dataset_status(uuid::Uuid::new_v4()),
        Err(RepoError::DatasetNotFound(_))
    ));
}
