//! Business logic services

pub mod catalog;
pub mod lending;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub lending: lending::LendingService,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            lending: lending::LendingService::new(repository, config.lending.clone()),
        }
    }
}
