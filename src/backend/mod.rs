pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod router;

use std::sync::Arc;

use crate::{access::resolver::Resolver, backend::identity::IdentityProvider};

pub struct AppState {
    pub resolver: Resolver,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(resolver: Resolver, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { resolver, identity }
    }
}
