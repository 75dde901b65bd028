pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;

use crate::alerts::evaluator::AlertEvaluator;
use crate::alerts::scheduler::CadenceScheduler;
use crate::alerts::store::SubscriptionStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SubscriptionStore>,
    pub evaluator: Arc<AlertEvaluator>,
    pub scheduler: Arc<CadenceScheduler>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
