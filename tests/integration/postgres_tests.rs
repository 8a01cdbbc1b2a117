//! PostgreSQL store tests
//!
//! Each test gets a fresh database with the migrations applied.
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres_tests -- --ignored

use chrono::{Duration, Utc};
use sqlx::PgPool;

use library_server::{
    error::{AppError, LendingError},
    models::{
        book::{Book, NewBook},
        borrow::{BorrowStatus, NewBorrow, ReturnBorrow},
        user::{NewUser, Role, User},
    },
    repository::Repository,
};

async fn member(repo: &Repository, n: i32) -> User {
    repo.members
        .create_user(
            NewUser {
                name: format!("Member {}", n),
                email: format!("member{}@example.com", n),
                password_hash: "not-a-real-hash".to_string(),
                phone: "081200000000".to_string(),
                address: String::new(),
                role: Role::Member,
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

async fn book(repo: &Repository, isbn: &str, stock: i32) -> Book {
    repo.catalog
        .create_book(
            NewBook {
                title: "Laskar Pelangi".to_string(),
                author: "Andrea Hirata".to_string(),
                isbn: isbn.to_string(),
                publisher: "Bentang Pustaka".to_string(),
                category: "Novel".to_string(),
                language: "Indonesian".to_string(),
                pages: 529,
                publish_year: 2005,
                stock,
                description: String::new(),
                location: "A-12".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

fn loan(user: &User, book: &Book, due_in_days: i64) -> NewBorrow {
    NewBorrow {
        user_id: user.id,
        book_id: book.id,
        due_date: Utc::now() + Duration::days(due_in_days),
        notes: String::new(),
    }
}

async fn counters(repo: &Repository, book: &Book) -> (i32, i32) {
    let b = repo.catalog.get_book(book.id).await.unwrap().unwrap();
    (b.stock, b.available)
}

fn lending_error<T>(result: Result<T, AppError>) -> LendingError {
    match result {
        Err(AppError::Lending(e)) => e,
        Err(other) => panic!("expected a lending error, got {:?}", other),
        Ok(_) => panic!("expected a lending error"),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_borrows_of_the_last_copies(pool: PgPool) {
    let repo = Repository::postgres(pool);
    let book = book(&repo, "9789793062792", 3).await;

    let mut handles = Vec::new();
    for n in 0..10 {
        let user = member(&repo, n).await;
        let repo = repo.clone();
        let new = loan(&user, &book, 7);
        handles.push(tokio::spawn(async move {
            repo.ledger.borrow(new, Utc::now()).await
        }));
    }

    let mut lent = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => lent += 1,
            Err(e) => assert_eq!(lending_error::<()>(Err(e)), LendingError::BookUnavailable),
        }
    }

    assert_eq!(lent, 3);
    assert_eq!(counters(&repo, &book).await, (3, 0));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_borrows_of_the_same_pair(pool: PgPool) {
    let repo = Repository::postgres(pool);
    let user = member(&repo, 1).await;
    let book = book(&repo, "9789793062792", 5).await;

    let first = tokio::spawn({
        let repo = repo.clone();
        let new = loan(&user, &book, 7);
        async move { repo.ledger.borrow(new, Utc::now()).await }
    });
    let second = tokio::spawn({
        let repo = repo.clone();
        let new = loan(&user, &book, 7);
        async move { repo.ledger.borrow(new, Utc::now()).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    for result in results {
        if let Err(e) = result {
            assert_eq!(lending_error::<()>(Err(e)), LendingError::DuplicateActiveBorrow);
        }
    }
    assert_eq!(counters(&repo, &book).await, (5, 4));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_active_pair_index_rejects_a_second_open_loan(pool: PgPool) {
    let repo = Repository::postgres(pool.clone());
    let user = member(&repo, 1).await;
    let book = book(&repo, "9789793062792", 2).await;
    repo.ledger.borrow(loan(&user, &book, 7), Utc::now()).await.unwrap();

    // The index the ledger maps to DuplicateActiveBorrow
    let err = sqlx::query(
        "INSERT INTO borrows (user_id, book_id, due_date, status) VALUES ($1, $2, NOW(), 'overdue')",
    )
    .bind(user.id)
    .bind(book.id)
    .execute(&pool)
    .await
    .unwrap_err();

    let db = err.as_database_error().expect("database error");
    assert_eq!(db.code().as_deref(), Some("23505"));
    assert_eq!(db.constraint(), Some("borrows_active_pair_key"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_return_after_sweep(pool: PgPool) {
    let repo = Repository::postgres(pool);
    let user = member(&repo, 1).await;
    let book = book(&repo, "9789793062792", 1).await;
    let borrow = repo
        .ledger
        .borrow(loan(&user, &book, -2), Utc::now())
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(repo.ledger.overdue_candidates(now).await.unwrap(), vec![borrow.id]);
    assert!(repo.ledger.mark_overdue(borrow.id, now).await.unwrap());
    assert!(!repo.ledger.mark_overdue(borrow.id, now).await.unwrap());
    assert!(repo.ledger.overdue_candidates(now).await.unwrap().is_empty());
    assert_eq!(counters(&repo, &book).await, (1, 0));

    let returned = repo
        .ledger
        .return_borrow(
            borrow.id,
            ReturnBorrow {
                fine: Some(rust_decimal::Decimal::new(500000, 2)),
                notes: Some("two days late".to_string()),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert!(!returned.is_overdue);
    assert_eq!(returned.notes, "two days late");
    assert_eq!(counters(&repo, &book).await, (1, 1));

    // A returned loan is never picked up by the sweep again
    assert!(!repo.ledger.mark_overdue(borrow.id, Utc::now()).await.unwrap());
    let again = repo
        .ledger
        .return_borrow(borrow.id, ReturnBorrow::default(), Utc::now())
        .await;
    assert_eq!(lending_error(again), LendingError::NotCurrentlyBorrowed);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_deletes_are_refused_while_on_loan(pool: PgPool) {
    let repo = Repository::postgres(pool);
    let user = member(&repo, 1).await;
    let book = book(&repo, "9789793062792", 1).await;
    let borrow = repo
        .ledger
        .borrow(loan(&user, &book, 7), Utc::now())
        .await
        .unwrap();

    let err = repo.catalog.delete_book(book.id, Utc::now()).await;
    assert_eq!(lending_error(err), LendingError::HasActiveBorrows);
    let err = repo.members.delete_user(user.id, Utc::now()).await;
    assert_eq!(lending_error(err), LendingError::HasActiveBorrows);

    repo.ledger
        .return_borrow(borrow.id, ReturnBorrow::default(), Utc::now())
        .await
        .unwrap();

    repo.catalog.delete_book(book.id, Utc::now()).await.unwrap();
    repo.members.delete_user(user.id, Utc::now()).await.unwrap();
    assert!(repo.catalog.get_book(book.id).await.unwrap().is_none());
    assert!(repo.members.get_user(user.id).await.unwrap().is_none());

    // History stays readable after both sides are gone
    let history = repo.ledger.get_borrow(borrow.id, Utc::now()).await.unwrap();
    assert_eq!(history.map(|b| b.status), Some(BorrowStatus::Returned));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_unique_indexes_map_to_conflict(pool: PgPool) {
    let repo = Repository::postgres(pool);
    member(&repo, 1).await;
    book(&repo, "9789793062792", 1).await;

    // Straight to the store, past the service pre-checks
    let err = repo
        .members
        .create_user(
            NewUser {
                name: "Member Again".to_string(),
                email: "MEMBER1@example.com".to_string(),
                password_hash: "not-a-real-hash".to_string(),
                phone: "081200000001".to_string(),
                address: String::new(),
                role: Role::Member,
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(err, Err(AppError::Conflict(_))), "{:?}", err);

    let err = repo
        .catalog
        .create_book(
            NewBook {
                title: "Sang Pemimpi".to_string(),
                author: "Andrea Hirata".to_string(),
                isbn: "9789793062792".to_string(),
                publisher: String::new(),
                category: "Novel".to_string(),
                language: "Indonesian".to_string(),
                pages: 292,
                publish_year: 2006,
                stock: 1,
                description: String::new(),
                location: String::new(),
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(err, Err(AppError::Conflict(_))), "{:?}", err);
}
