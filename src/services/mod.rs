pub mod availability;
pub mod collaborators;
pub mod gateway;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod reconcile;
pub mod status_cache;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::store::BookingStore;
use collaborators::{AssetCatalog, CustomerDirectory, InsuranceCatalog, Ledger, LegRequests};
use gateway::PaymentGateway;
use notify::{BookingNotifications, Notifier};
use orders::OrderService;
use pricing::PricingCalculator;
use reconcile::PaymentReconciler;
use status_cache::StatusCountCache;

/// Everything the core talks to but does not own.
pub struct Collaborators {
    pub store: Arc<dyn BookingStore>,
    pub legs: Arc<dyn LegRequests>,
    pub assets: Arc<dyn AssetCatalog>,
    pub insurances: Arc<dyn InsuranceCatalog>,
    pub directory: Arc<dyn CustomerDirectory>,
    pub ledger: Arc<dyn Ledger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Clone)]
pub struct Services {
    pub orders: Arc<OrderService>,
    pub reconciler: Arc<PaymentReconciler>,
}

impl Services {
    pub fn build(deps: Collaborators, config: &AppConfig) -> AppResult<Self> {
        let tz = config.tz()?;

        let cache = Arc::new(StatusCountCache::new(
            deps.store.clone(),
            Duration::from_secs(config.cache.status_ttl_secs),
        ));
        let notifications = BookingNotifications::new(deps.notifier, config.mail.clone(), tz);
        let pricing = Arc::new(PricingCalculator::new(
            deps.assets.clone(),
            deps.insurances,
            config.pricing.clone(),
            tz,
        ));

        let reconciler = Arc::new(PaymentReconciler::new(
            deps.gateway.clone(),
            deps.store.clone(),
            deps.assets.clone(),
            deps.directory.clone(),
            deps.ledger.clone(),
            notifications.clone(),
            cache.clone(),
            config.reconcile.clone(),
        ));

        let orders = Arc::new(OrderService::new(
            deps.store,
            deps.legs,
            deps.assets,
            deps.directory,
            deps.ledger,
            deps.gateway,
            pricing,
            notifications,
            cache,
            reconciler.clone(),
            config.gateway.tax_id.clone(),
            tz,
        ));

        Ok(Self { orders, reconciler })
    }
}
