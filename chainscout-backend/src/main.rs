use chainscout_backend::config::Config;
use chainscout_backend::pricing::{PlanCatalog, PlanPricing};
use chainscout_backend::scheduler::{MaintenanceScheduler, SchedulerConfig};
use chainscout_backend::store::StoreHandle;
use dotenv::dotenv;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    log::info!("Using config directory: {:?}", config.config_dir);

    let store = StoreHandle::new(config.database.clone());
    if !store.init() {
        log::error!("Could not open database at {}, exiting", config.database.url);
        std::process::exit(1);
    }
    let db = match store.get() {
        Ok(db) => db,
        Err(e) => {
            log::error!("Database unavailable after init: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Loading premium plans from config directory");
    let catalog = PlanCatalog::load(&config.config_dir);
    for plan in catalog.plan_names() {
        match catalog.plan_payment_details(&plan, "ETH") {
            Ok(details) => log::info!(
                "[pricing] {} plan: {} days, {} {}",
                plan,
                details.duration_days,
                details.amount,
                details.currency
            ),
            Err(e) => log::debug!("[pricing] {}: {}", plan, e),
        }
    }

    // Initialize and start the scheduler
    log::info!("Initializing scheduler");
    let scheduler = Arc::new(MaintenanceScheduler::new(
        Arc::clone(&db),
        SchedulerConfig::from(&config),
    ));

    let scheduler_handle = Arc::clone(&scheduler);
    let (scheduler_shutdown_tx, scheduler_shutdown_rx) = tokio::sync::oneshot::channel();
    let scheduler_task = tokio::spawn(async move {
        scheduler_handle.start(scheduler_shutdown_rx).await;
    });

    match db.user_counts() {
        Ok(counts) => log::info!(
            "ChainScout store ready: {} users ({} premium, {} active today)",
            counts.total_users,
            counts.premium_users,
            counts.active_today
        ),
        Err(e) => log::warn!("Could not read user stats: {}", e),
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    log::info!("Shutting down");

    let _ = scheduler_shutdown_tx.send(());
    if let Err(e) = scheduler_task.await {
        log::error!("Scheduler task failed: {}", e);
    }

    drop(db);
    store.close();
}
