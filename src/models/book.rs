//! Book model and inventory rules

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::error::{AppError, AppResult};

/// Largest fee that fits NUMERIC(8, 2)
const MAX_DAILY_FEE: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

/// Book cover type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cover {
    Soft,
    Hard,
}

impl Cover {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cover::Soft => "SOFT",
            Cover::Hard => "HARD",
        }
    }
}

impl std::fmt::Display for Cover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Cover {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SOFT" => Ok(Cover::Soft),
            "HARD" => Ok(Cover::Hard),
            _ => Err(format!("Invalid cover type: {}", s)),
        }
    }
}

// SQLx conversion for Cover (stored as text)
impl sqlx::Type<Postgres> for Cover {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Cover {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Cover {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    /// Daily rental fee, two fractional digits
    #[schema(value_type = String, example = "0.50")]
    pub daily_fee: Decimal,
    /// Number of copies available
    pub inventory: i32,
    pub cover: Cover,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.inventory > 0
    }

    /// Take one copy off the shelf. Inventory never drops below zero.
    pub fn take_copy(&mut self) -> AppResult<()> {
        if !self.is_available() {
            return Err(AppError::OutOfStock(format!(
                "All copies of the book '{}' are currently unavailable for borrowing",
                self.title
            )));
        }
        self.inventory -= 1;
        Ok(())
    }

    /// Put one copy back on the shelf.
    pub fn put_back_copy(&mut self) -> AppResult<()> {
        self.inventory = self.inventory.checked_add(1).ok_or_else(|| {
            AppError::Internal(format!("Inventory overflow for book {}", self.id))
        })?;
        Ok(())
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {} : {} pcs", self.title, self.author, self.inventory)
    }
}

fn validate_daily_fee(fee: &Decimal) -> Result<(), ValidationError> {
    if fee.is_sign_negative() && !fee.is_zero() {
        return Err(ValidationError::new("daily_fee_negative"));
    }
    if fee.normalize().scale() > 2 {
        return Err(ValidationError::new("daily_fee_precision"));
    }
    if *fee > MAX_DAILY_FEE {
        return Err(ValidationError::new("daily_fee_too_large"));
    }
    Ok(())
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: String,
    #[validate(custom(function = "validate_daily_fee"))]
    #[schema(value_type = String, example = "0.50")]
    pub daily_fee: Decimal,
    #[validate(range(min = 0, message = "Inventory cannot be negative"))]
    pub inventory: i32,
    pub cover: Cover,
}

/// Update book request (staff only). Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: Option<String>,
    #[validate(custom(function = "validate_daily_fee"))]
    #[schema(value_type = Option<String>, example = "0.50")]
    pub daily_fee: Option<Decimal>,
    #[validate(range(min = 0, message = "Inventory cannot be negative"))]
    pub inventory: Option<i32>,
    pub cover: Option<Cover>,
}
