use std::{env, process, sync::Arc};

use log::{error, info};
use parlor_collab::{Collab, LogNotifier, PgDatabase};
use parlor_server::{logging, run_server};

#[tokio::main]
async fn main() {
    logging::init_logger();

    let database_url = match env::var("PARLOR_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            error!("PARLOR_DATABASE_URL must be set");
            process::exit(1);
        }
    };

    info!("Connecting to database...");

    let database = match PgDatabase::new(&database_url).await {
        Ok(database) => database,
        Err(e) => {
            error!("Could not connect to database: {}", e);
            process::exit(1);
        }
    };

    let collab = Arc::new(Collab::new(Arc::new(database), Arc::new(LogNotifier)));

    info!("Initialized successfully.");

    run_server(collab).await
}
