//! Borrowing lifecycle tests against a real database

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bookrent_server::{
    error::AppError,
    models::{
        book::{Book, Cover, CreateBook},
        borrowing::BorrowingQuery,
        user::UserClaims,
    },
    repository::Repository,
    services::{borrowings::today, notifier::Notifier, Services},
};

/// Keeps every message instead of sending it
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) {
        self.sent.lock().unwrap().push(text.to_string());
    }
}

struct Fixture {
    services: Services,
    notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    fn new(pool: PgPool) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let services = Services::new(Repository::new(pool), notifier.clone());
        Self { services, notifier }
    }

    async fn book(&self, inventory: i32) -> Book {
        self.services
            .catalog
            .create_book(CreateBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                daily_fee: Decimal::new(150, 2),
                inventory,
                cover: Cover::Hard,
            })
            .await
            .unwrap()
    }

    async fn inventory(&self, book_id: i32) -> i32 {
        self.services.catalog.get_book(book_id).await.unwrap().inventory
    }
}

async fn user(pool: &PgPool, email: &str, is_staff: bool) -> i32 {
    sqlx::query_scalar("INSERT INTO users (email, is_staff) VALUES ($1, $2) RETURNING id")
        .bind(email)
        .bind(is_staff)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn claims(user_id: i32, is_staff: bool) -> UserClaims {
    UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        is_staff,
        exp: 0,
        iat: 0,
    }
}

fn in_days(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_create_decrements_inventory(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(5).await;

    let borrowing = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(12))
        .await
        .unwrap();

    assert_eq!(borrowing.borrow_date, today());
    assert_eq!(borrowing.expected_return_date, in_days(12));
    assert!(borrowing.actual_return_date.is_none());
    assert_eq!(borrowing.user_id, reader);
    assert_eq!(fixture.inventory(book.id).await, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_create_out_of_stock_keeps_inventory(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool.clone());
    let book = fixture.book(0).await;

    let err = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(3))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OutOfStock(_)));
    assert_eq!(fixture.inventory(book.id).await, 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrowings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_invalid_dates_roll_back_reservation(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(2).await;

    let too_late = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(20))
        .await
        .unwrap_err();
    assert!(matches!(too_late, AppError::Validation(_)));

    let in_the_past = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(-1))
        .await
        .unwrap_err();
    assert!(matches!(in_the_past, AppError::Validation(_)));

    assert_eq!(fixture.inventory(book.id).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_unknown_book(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);

    let err = fixture
        .services
        .borrowings
        .create_borrowing(reader, 9999, in_days(3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_return_restores_inventory(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(3).await;
    let borrowings = &fixture.services.borrowings;

    let borrowing = borrowings
        .create_borrowing(reader, book.id, in_days(7))
        .await
        .unwrap();
    assert_eq!(fixture.inventory(book.id).await, 2);

    let returned = borrowings.return_borrowing(borrowing.id, None).await.unwrap();

    assert_eq!(returned.actual_return_date, Some(today()));
    assert_eq!(fixture.inventory(book.id).await, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_second_return_is_rejected(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(1).await;
    let borrowings = &fixture.services.borrowings;

    let borrowing = borrowings
        .create_borrowing(reader, book.id, in_days(7))
        .await
        .unwrap();
    borrowings.return_borrowing(borrowing.id, None).await.unwrap();

    let err = borrowings
        .return_borrowing(borrowing.id, Some(in_days(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyReturned(id) if id == borrowing.id));
    assert_eq!(fixture.inventory(book.id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_return_before_borrow_date_is_rejected(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(1).await;
    let borrowings = &fixture.services.borrowings;

    let borrowing = borrowings
        .create_borrowing(reader, book.id, in_days(7))
        .await
        .unwrap();

    let err = borrowings
        .return_borrowing(borrowing.id, Some(in_days(-1)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidDate(_)));
    assert_eq!(fixture.inventory(book.id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_scenario_from_five_copies(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(5).await;
    let borrowings = &fixture.services.borrowings;

    let first = borrowings
        .create_borrowing(reader, book.id, in_days(12))
        .await
        .unwrap();
    assert_eq!(fixture.inventory(book.id).await, 4);

    let too_long = borrowings
        .create_borrowing(reader, book.id, in_days(20))
        .await
        .unwrap_err();
    assert!(matches!(too_long, AppError::Validation(_)));
    assert_eq!(fixture.inventory(book.id).await, 4);

    let returned = borrowings
        .return_borrowing(first.id, Some(in_days(3)))
        .await
        .unwrap();
    assert_eq!(returned.actual_return_date, Some(in_days(3)));
    assert_eq!(fixture.inventory(book.id).await, 5);

    let again = borrowings.return_borrowing(first.id, None).await.unwrap_err();
    assert!(matches!(again, AppError::AlreadyReturned(_)));
    assert_eq!(fixture.inventory(book.id).await, 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_creates_take_last_copy_once(pool: PgPool) {
    const CALLERS: usize = 8;

    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(1).await;

    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let borrowings = fixture.services.borrowings.clone();
        let book_id = book.id;
        handles.push(tokio::spawn(async move {
            borrowings.create_borrowing(reader, book_id, in_days(5)).await
        }));
    }

    let mut created = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::OutOfStock(_)) => out_of_stock += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(out_of_stock, CALLERS - 1);
    assert_eq!(fixture.inventory(book.id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_concurrent_returns_close_once(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(1).await;

    let borrowing = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(5))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let borrowings = fixture.services.borrowings.clone();
        let id = borrowing.id;
        handles.push(tokio::spawn(async move {
            borrowings.return_borrowing(id, None).await
        }));
    }

    let mut returned = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => returned += 1,
            Err(AppError::AlreadyReturned(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(returned, 1);
    assert_eq!(fixture.inventory(book.id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_notification_after_create(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(2).await;

    let borrowing = fixture
        .services
        .borrowings
        .create_borrowing(reader, book.id, in_days(5))
        .await
        .unwrap();

    // delivery runs on a detached task
    for _ in 0..50 {
        if !fixture.notifier.sent.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let sent = fixture.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains(&format!("Borrowing ID: {}", borrowing.id)));
    assert!(sent[0].contains("Book Title: Dune"));
    assert!(sent[0].contains("Book Author: Frank Herbert"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_listing_respects_caller(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let other = user(&pool, "other@test.com", false).await;
    let admin = user(&pool, "admin@test.com", true).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(5).await;
    let borrowings = &fixture.services.borrowings;

    let own = borrowings.create_borrowing(reader, book.id, in_days(5)).await.unwrap();
    let foreign = borrowings.create_borrowing(other, book.id, in_days(5)).await.unwrap();
    borrowings.return_borrowing(foreign.id, None).await.unwrap();

    // user_id is ignored for regular users
    let query = BorrowingQuery {
        is_active: None,
        user_id: Some(other),
    };
    let listed = borrowings.list_borrowings(&claims(reader, false), &query).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, own.id);

    let all = borrowings
        .list_borrowings(&claims(admin, true), &BorrowingQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let by_user = borrowings.list_borrowings(&claims(admin, true), &query).await.unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].id, foreign.id);

    let active = BorrowingQuery {
        is_active: Some(true),
        user_id: None,
    };
    let open = borrowings.list_borrowings(&claims(admin, true), &active).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, own.id);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_details_and_visibility(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let other = user(&pool, "other@test.com", false).await;
    let fixture = Fixture::new(pool);
    let book = fixture.book(2).await;
    let borrowings = &fixture.services.borrowings;

    let borrowing = borrowings.create_borrowing(reader, book.id, in_days(5)).await.unwrap();

    let details = borrowings
        .get_details(borrowing.id, &claims(reader, false))
        .await
        .unwrap();
    assert_eq!(details.book, "Dune - Frank Herbert : 1 pcs");
    assert_eq!(details.user, "reader@test.com");

    let hidden = borrowings
        .get_details(borrowing.id, &claims(other, false))
        .await
        .unwrap_err();
    assert!(matches!(hidden, AppError::NotFound(_)));

    let not_theirs = borrowings
        .return_for_caller(borrowing.id, &claims(other, false), None)
        .await
        .unwrap_err();
    assert!(matches!(not_theirs, AppError::NotFound(_)));
    assert_eq!(fixture.inventory(book.id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_schema_rejects_bad_rows(pool: PgPool) {
    let reader = user(&pool, "reader@test.com", false).await;
    let fixture = Fixture::new(pool.clone());
    let book = fixture.book(1).await;

    let negative_inventory = sqlx::query("UPDATE books SET inventory = -1 WHERE id = $1")
        .bind(book.id)
        .execute(&pool)
        .await;
    assert!(negative_inventory.is_err());

    let three_weeks = sqlx::query(
        "INSERT INTO borrowings (borrow_date, expected_return_date, book_id, user_id) VALUES ($1, $2, $3, $4)",
    )
    .bind(today())
    .bind(in_days(21))
    .bind(book.id)
    .bind(reader)
    .execute(&pool)
    .await;
    assert!(three_weeks.is_err());
}
