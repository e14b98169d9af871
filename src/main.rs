use energomera2prom::{transport::SerialChannelOpener, ApiManager, Config, EnergomeraManager, ReadingCache};
use tokio::task::JoinHandle;
use std::{sync::Arc, time::Duration};
use log::{error, info};


#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("E2P_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };

    let serial_port = config.serial_port().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // shared between the poll loop (writer) and the http side (reader)
    let cache = Arc::new(ReadingCache::new());

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    let poller = EnergomeraManager::new(
        Arc::new(SerialChannelOpener::new(serial_port)),
        cache.clone(),
        config.meter.password.clone(),
        config.meter.poll_interval(),
        config.meter.max_frame_len,
    );
    threads.push(tokio::spawn(async move {
        poller.start_thread().await;
    }));

    let api = ApiManager::new(cache, config);
    threads.push(tokio::spawn(async move {
        if let Err(e) = api.start_thread().await {
            error!("HTTP server stopped: {e}");
        }
    }));

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        if threads.iter().any(|t| t.is_finished()) {
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    Ok(())
}
