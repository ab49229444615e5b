// Backend access layer: the single configured handle every service goes through.
// Services never write SQL strings against table names directly; they build
// queries with `query::{Select, Insert, Update, Delete}` against a `Table`.

pub mod cache;
pub mod pagination;
pub mod query;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Every table the marketplace reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Address,
    Services,
    Experiences,
    Educations,
    SocialProfile,
    CaVerifications,
    ContactRequests,
    Posts,
    Comments,
    Categories,
    Tags,
    States,
    Districts,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Address => "address",
            Table::Services => "services",
            Table::Experiences => "experiences",
            Table::Educations => "educations",
            Table::SocialProfile => "social_profile",
            Table::CaVerifications => "ca_verifications",
            Table::ContactRequests => "contact_requests",
            Table::Posts => "posts",
            Table::Comments => "comments",
            Table::Categories => "categories",
            Table::Tags => "tags",
            Table::States => "states",
            Table::Districts => "districts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// `single()` found zero rows.
    #[error("no matching row in {table}")]
    NotFound { table: &'static str },

    /// A row came back in a shape the typed boundary rejects.
    #[error("malformed row in {table}: {reason}")]
    Malformed { table: &'static str, reason: String },

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl BackendError {
    /// Sorts a driver error into the boundary's error kinds.
    pub fn classify(table: Table, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BackendError::NotFound {
                table: table.as_str(),
            },
            sqlx::Error::ColumnDecode { index, source } => BackendError::Malformed {
                table: table.as_str(),
                reason: format!("column {index}: {source}"),
            },
            sqlx::Error::ColumnNotFound(column) => BackendError::Malformed {
                table: table.as_str(),
                reason: format!("missing column {column}"),
            },
            sqlx::Error::Decode(source) => BackendError::Malformed {
                table: table.as_str(),
                reason: source.to_string(),
            },
            other => BackendError::Sqlx(other),
        }
    }
}

/// Parses a text column into its typed enum, rejecting unknown values.
pub fn parse_column<T>(table: Table, column: &str, raw: &str) -> Result<T, BackendError>
where
    T: FromStr,
{
    raw.parse::<T>().map_err(|_| BackendError::Malformed {
        table: table.as_str(),
        reason: format!("unexpected {column} value '{raw}'"),
    })
}
