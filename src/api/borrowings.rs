//! Borrowing endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::borrowing::{Borrowing, BorrowingDetails, BorrowingQuery},
};

use super::AuthenticatedUser;

/// Create borrowing request
#[derive(Deserialize, ToSchema)]
pub struct CreateBorrowingRequest {
    /// Expected return date, at most 14 days from today
    pub expected_return_date: NaiveDate,
    /// Book to borrow
    pub book_id: i32,
}

/// Return borrowing request
#[derive(Default, Deserialize, ToSchema)]
pub struct ReturnBorrowingRequest {
    /// Defaults to today
    pub actual_return_date: Option<NaiveDate>,
}

impl ReturnBorrowingRequest {
    /// An empty body means "return today". Anything else must parse, since
    /// the return date cannot be changed once stamped.
    pub fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid return request: {}", e)))
    }
}

/// List borrowings
#[utoipa::path(
    get,
    path = "/borrowings/",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Borrowings visible to the caller", body = Vec<Borrowing>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<Vec<Borrowing>>> {
    let borrowings = state
        .services
        .borrowings
        .list_borrowings(&claims, &query)
        .await?;
    Ok(Json(borrowings))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrowings/",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowingRequest,
    responses(
        (status = 201, description = "Borrowing created", body = Borrowing),
        (status = 400, description = "Out of stock or invalid dates"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowingRequest>,
) -> AppResult<(StatusCode, Json<Borrowing>)> {
    let borrowing = state
        .services
        .borrowings
        .create_borrowing(claims.user_id, request.book_id, request.expected_return_date)
        .await?;

    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Get borrowing details
#[utoipa::path(
    get,
    path = "/borrowings/{id}/",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    let details = state.services.borrowings.get_details(id, &claims).await?;
    Ok(Json(details))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return/",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrowing ID")
    ),
    request_body(content = ReturnBorrowingRequest, description = "Optional return date"),
    responses(
        (status = 200, description = "Borrowing returned", body = Borrowing),
        (status = 400, description = "Unreadable body, already returned or date before borrow date"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn return_borrowing(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    body: Bytes,
) -> AppResult<Json<Borrowing>> {
    let request = ReturnBorrowingRequest::from_body(&body)?;

    let borrowing = state
        .services
        .borrowings
        .return_for_caller(id, &claims, request.actual_return_date)
        .await?;

    Ok(Json(borrowing))
}
