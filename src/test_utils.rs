//! Substitutes shared by unit and HTTP tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::Configuration;
use crate::crypto::PasswordManager;
use crate::error::{Result as ServerResult, ServerError};
use crate::odata::specification::Specification;
use crate::odata::{ODataService, Result, SpecificationRepository};
use crate::shopfloor::order::{self, Order};
use crate::shopfloor::product::{self, Product};
use crate::token::TokenManager;
use crate::user::{Role, RoleName, User, UserRepository};
use crate::AppState;

pub const TOKEN_SECRET: &str = "test-secret";

/// Entity with an `Edm.Int64` key.
pub trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for Order {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for Product {
    fn key(&self) -> i64 {
        self.id
    }
}

/// In-memory repository recording every specification it receives.
///
/// Filters and ordering are not evaluated, paging is.
pub struct RecordingRepository<T> {
    items: Vec<T>,
    find_all: Mutex<Vec<Specification>>,
    count: Mutex<Vec<Specification>>,
    find_by_key: Mutex<Vec<i64>>,
}

impl<T> RecordingRepository<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            find_all: Mutex::default(),
            count: Mutex::default(),
            find_by_key: Mutex::default(),
        }
    }

    pub fn find_all_calls(&self) -> Vec<Specification> {
        self.find_all.lock().unwrap().clone()
    }

    pub fn count_calls(&self) -> Vec<Specification> {
        self.count.lock().unwrap().clone()
    }

    pub fn find_by_key_calls(&self) -> Vec<i64> {
        self.find_by_key.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Keyed + Clone + Send + Sync> SpecificationRepository<T> for RecordingRepository<T> {
    async fn find_all(&self, spec: &Specification) -> Result<Vec<T>> {
        self.find_all.lock().unwrap().push(spec.clone());
        let limit = spec.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self
            .items
            .iter()
            .skip(spec.skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, spec: &Specification) -> Result<i64> {
        self.count.lock().unwrap().push(spec.clone());
        Ok(self.items.len() as i64)
    }

    async fn find_by_key(&self, key: i64) -> Result<Option<T>> {
        self.find_by_key.lock().unwrap().push(key);
        Ok(self.items.iter().find(|item| item.key() == key).cloned())
    }
}

pub fn sample_orders() -> Vec<Order> {
    let created_at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    vec![
        Order {
            id: 1,
            order_number: "ORD-1".into(),
            name: "Gearbox".into(),
            title: "Assemble gearbox".into(),
            description: None,
            created_at,
            updated_at: None,
        },
        Order {
            id: 2,
            order_number: "ORD-2".into(),
            name: "Pump".into(),
            title: "Test pump".into(),
            description: Some("Pressure test at 6 bar".into()),
            created_at,
            updated_at: Some(created_at),
        },
        Order {
            id: 3,
            order_number: "ORD-3".into(),
            name: "Valve".into(),
            title: "Pack valves".into(),
            description: None,
            created_at,
            updated_at: None,
        },
    ]
}

pub fn sample_products() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            product_number: "P-100".into(),
            name: "Hex bolt M8".into(),
            kind: "Bolt".into(),
            country: "DE".into(),
            packaging_size: "100".into(),
            language: "de".into(),
            description: None,
        },
        Product {
            id: 2,
            product_number: "P-200".into(),
            name: "Hex nut M8".into(),
            kind: "Nut".into(),
            country: "FR".into(),
            packaging_size: "250".into(),
            language: "fr".into(),
            description: Some("Zinc plated".into()),
        },
    ]
}

/// Users kept in memory, keyed by username.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> ServerResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(username).cloned())
    }

    async fn insert(&self, user: &User, roles: &[RoleName]) -> ServerResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.username) {
            return Err(ServerError::Conflict("users_username_key".into()));
        }

        let mut created = user.clone().with_id(users.len() as i64 + 1);
        created.set_roles(roles.iter().map(|&name| role(name)).collect());
        users.insert(created.username.clone(), created.clone());
        Ok(created)
    }

    async fn assign_role(&self, username: &str, name: RoleName) -> ServerResult<bool> {
        Ok(match self.users.lock().unwrap().get_mut(username) {
            Some(user) => {
                user.roles.insert(role(name));
                true
            },
            None => false,
        })
    }
}

fn role(name: RoleName) -> Role {
    Role {
        id: match name {
            RoleName::Editor => 1,
            RoleName::Operator => 2,
        },
        name,
    }
}

/// Small, fast Argon2 parameters.
pub fn password_manager() -> PasswordManager {
    PasswordManager::new(Some(crate::config::Argon2 {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .unwrap()
}

/// Application state over in-memory repositories.
pub fn state() -> AppState {
    let config = Arc::new(Configuration::default());
    let orders = Arc::new(RecordingRepository::new(sample_orders()));
    let products = Arc::new(RecordingRepository::new(sample_products()));

    let odata = ODataService::builder(config.service_root())
        .entity(order::entity_processor(orders.clone()).with_max_page_size(2))
        .primitive(order::primitive_processor(orders))
        .entity(product::entity_processor(products.clone()))
        .primitive(product::primitive_processor(products))
        .build();

    AppState {
        token: TokenManager::new(&config.url, TOKEN_SECRET).unwrap(),
        config,
        users: Arc::new(MemoryUserRepository::default()),
        odata: Arc::new(odata),
        crypto: Arc::new(password_manager()),
        metrics: None,
    }
}

/// Register `username` holding `roles` and return a bearer token for it.
pub async fn user_token(state: &AppState, username: &str, roles: &[RoleName]) -> String {
    let password = state.crypto.hash_password("correct horse").unwrap();
    state
        .users
        .insert(&User::new(username, password), roles)
        .await
        .unwrap();
    state.token.create(username).unwrap()
}
