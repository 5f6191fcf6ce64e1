use domain::segment::SeedOutcome;
use domain::Engine;
use events::EventPublisher;
use log::{error, info};
use migration::{Migrator, MigratorTrait};
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Seeding system segments [{}]...", config.database_url());

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(db.as_ref(), None).await {
        error!("Failed to apply database migrations: {e}");
        std::process::exit(1);
    }

    let engine = Engine::from_database(db, &config, EventPublisher::default());

    match engine.seed_all_profiles().await {
        Ok(outcomes) => {
            for (profile_id, outcome) in outcomes {
                match outcome {
                    SeedOutcome::Seeded(segments) => {
                        info!("Profile {profile_id}: seeded {} segment(s)", segments.len())
                    }
                    SeedOutcome::AlreadyInitialized => {
                        info!("Profile {profile_id}: already initialized")
                    }
                }
            }
        }
        Err(e) => {
            error!("Seeding failed: {e}");
            std::process::exit(1);
        }
    }
}
