//! Business logic services

pub mod borrowings;
pub mod catalog;
pub mod notifier;

use std::sync::Arc;

use crate::repository::Repository;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub catalog: catalog::CatalogService,
    pub borrowings: borrowings::BorrowingsService,
}

impl Services {
    /// Create all services with the given repository and notifier
    pub fn new(repository: Repository, notifier: Arc<dyn notifier::Notifier>) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            borrowings: borrowings::BorrowingsService::new(repository.clone(), notifier),
            repository,
        }
    }
}
