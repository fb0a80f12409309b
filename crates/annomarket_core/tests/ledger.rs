use annomarket_core::db::open_db_in_memory;
use annomarket_core::{
    AccountId, AccountRepository, AccountService, Amount, Ledger, MarketConfig, NewAccount,
    RepoError, Role, SqliteAccountRepository, SqliteLedger,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::{Connection, TransactionBehavior};

fn open_account(conn: &Connection, username: &str, balance: Amount) -> AccountId {
    let repo = SqliteAccountRepository::try_new(conn).unwrap();
    repo.create_account(&NewAccount {
        username: username.to_string(),
        password_hash: format!("hash-{username}"),
        email: None,
        role: Role::Contributor,
        opening_balance: balance,
    })
    .unwrap()
}

#[test]
fn debit_and_credit_move_balance() {
    let conn = open_db_in_memory().unwrap();
    let account = open_account(&conn, "con1", Amount::from_units(100));
    let ledger = SqliteLedger::try_new(&conn).unwrap();

    assert_eq!(
        ledger.debit(account, Amount::from_units(40)).unwrap(),
        Amount::from_units(60)
    );
    assert_eq!(
        ledger.credit(account, Amount::from_units(5)).unwrap(),
        Amount::from_units(65)
    );
    assert_eq!(ledger.balance(account).unwrap(), Amount::from_units(65));
}

#[test]
fn debit_beyond_balance_fails_and_leaves_balance() {
    let conn = open_db_in_memory().unwrap();
    let account = open_account(&conn, "con1", Amount::from_units(20));
    let ledger = SqliteLedger::try_new(&conn).unwrap();

    let err = ledger.debit(account, Amount::from_units(50)).unwrap_err();
    match err {
        RepoError::InsufficientFunds {
            account: failed,
            balance,
            requested,
        } => {
            assert_eq!(failed, account);
            assert_eq!(balance, Amount::from_units(20));
            assert_eq!(requested, Amount::from_units(50));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.balance(account).unwrap(), Amount::from_units(20));
}

#[test]
fn debit_of_exact_balance_reaches_zero() {
    let conn = open_db_in_memory().unwrap();
    let account = open_account(&conn, "con1", Amount::from_units(7));
    let ledger = SqliteLedger::try_new(&conn).unwrap();

    assert_eq!(
        ledger.debit(account, Amount::from_units(7)).unwrap(),
        Amount::ZERO
    );
}

#[test]
fn unknown_account_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteLedger::try_new(&conn).unwrap();
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(
        ledger.credit(missing, Amount::from_units(1)),
        Err(RepoError::AccountNotFound(id)) if id == missing
    ));
    assert!(matches!(
        ledger.debit(missing, Amount::from_units(1)),
        Err(RepoError::AccountNotFound(id)) if id == missing
    ));
}

#[test]
fn ledger_mutations_roll_back_with_enclosing_transaction() {
    let mut conn = open_db_in_memory().unwrap();
    let account = open_account(&conn, "con1", Amount::from_units(100));

    {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        let ledger = SqliteLedger::try_new(&tx).unwrap();
        ledger.debit(account, Amount::from_units(30)).unwrap();
        assert_eq!(ledger.balance(account).unwrap(), Amount::from_units(70));
        // dropped without commit
    }

    let ledger = SqliteLedger::try_new(&conn).unwrap();
    assert_eq!(ledger.balance(account).unwrap(), Amount::from_units(100));
}

#[test]
fn randomized_operations_never_drive_balance_negative() {
    let conn = open_db_in_memory().unwrap();
    let account = open_account(&conn, "con1", Amount::from_units(10));
    let ledger = SqliteLedger::try_new(&conn).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut expected = Amount::from_units(10).micros();

    for _ in 0..500 {
        let amount = Amount::from_micros(rng.gen_range(0..5_000_000)).unwrap();
        if rng.gen_bool(0.6) {
            match ledger.debit(account, amount) {
                Ok(balance) => {
                    assert!(amount.micros() <= expected);
                    expected -= amount.micros();
                    assert_eq!(balance.micros(), expected);
                }
                Err(RepoError::InsufficientFunds { balance, .. }) => {
                    assert!(amount.micros() > expected);
                    assert_eq!(balance.micros(), expected);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        } else {
            expected += amount.micros();
            assert_eq!(ledger.credit(account, amount).unwrap().micros(), expected);
        }
        assert!(ledger.balance(account).unwrap().micros() >= 0);
    }
}

#[test]
fn registration_applies_configured_opening_balances() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(
        SqliteAccountRepository::try_new(&conn).unwrap(),
        MarketConfig::default(),
    );

    let contributor = service
        .register("con1", "h1", Some("con1@example.com".to_string()), Role::Contributor)
        .unwrap();
    let annotator = service.register("ano1", "h2", None, Role::Annotator).unwrap();

    let ledger = SqliteLedger::try_new(&conn).unwrap();
    assert_eq!(ledger.balance(contributor).unwrap(), Amount::from_units(100));
    assert_eq!(ledger.balance(annotator).unwrap(), Amount::ZERO);
}

#[test]
fn usernames_are_unique_across_roles_and_credentials_verify() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(
        SqliteAccountRepository::try_new(&conn).unwrap(),
        MarketConfig::default(),
    );

    let id = service.register("sam", "secret-hash", None, Role::Annotator).unwrap();
    let duplicate = service
        .register("sam", "other", None, Role::Contributor)
        .unwrap_err();
    assert!(matches!(duplicate, RepoError::DuplicateUsername(name) if name == "sam"));

    assert_eq!(service.login("sam", "secret-hash").unwrap(), id);
    assert!(matches!(
        service.login("sam", "wrong"),
        Err(RepoError::InvalidCredentials)
    ));
    assert!(matches!(
        service.login("nobody", "secret-hash"),
        Err(RepoError::InvalidCredentials)
    ));

    let account = service.get_account(id).unwrap().unwrap();
    assert_eq!(account.role, Role::Annotator);
    assert_eq!(account.username, "sam");
}
