use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::BackendClient;
use crate::events::BackendEvent;

const HEALTH_INTERVAL: Duration = Duration::from_secs(10);
const PROFILE_INTERVAL: Duration = Duration::from_secs(60);

/// Fixed-interval background refresh (connectivity probe + profile list),
/// tied to the app lifetime. The first tick of each interval fires
/// immediately, which doubles as the mount-time health check.
pub struct Poller {
    handles: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn start(client: BackendClient, tx: mpsc::UnboundedSender<BackendEvent>) -> Self {
        let health = {
            let client = client.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_INTERVAL);
                loop {
                    interval.tick().await;
                    let result = client.health().await;
                    if tx.send(BackendEvent::Health(result)).is_err() {
                        break;
                    }
                }
            })
        };

        let profiles = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROFILE_INTERVAL);
            loop {
                interval.tick().await;
                let result = client.list_profiles().await;
                if tx.send(BackendEvent::ProfilesLoaded(result)).is_err() {
                    break;
                }
            }
        });

        Self {
            handles: vec![health, profiles],
        }
    }

    pub fn stop(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
