//! Manager (spec §4.3): owns the set of workers keyed by host, diffs a new
//! configuration against the running set, and joins everything on shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::store::ProfileStore;

use super::worker::{JobBinding, ScrapeWorker};

/// Flattens a config into `{host → JobBinding}`. Duplicate hosts across jobs
/// resolve first-write-wins, with a warning — spec §9's preferred,
/// deterministic resolution of an otherwise-undocumented original behavior.
fn flatten(config: &CollectorConfig) -> HashMap<String, JobBinding> {
    let mut hosts = HashMap::new();
    for job in &config.scrape_configs {
        for target in &job.targets {
            for host in &target.hosts {
                if hosts.contains_key(host) {
                    warn!(host = %host, job = %job.job, "duplicate host across jobs, keeping first binding");
                    continue;
                }
                hosts.insert(
                    host.clone(),
                    JobBinding {
                        job: job.clone(),
                        target: target.clone(),
                        host: host.clone(),
                    },
                );
            }
        }
    }
    hosts
}

/// Owns the dynamic fleet of per-host [`ScrapeWorker`]s and applies
/// hot-reloaded configuration to it (spec §4.3).
pub struct Manager {
    workers: Mutex<HashMap<String, ScrapeWorker>>,
    store: Arc<dyn ProfileStore>,
}

impl Manager {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Applies a configuration: add workers for new hosts, reload workers for
    /// unchanged hosts, stop and remove workers for hosts no longer present.
    /// Idempotent when applied to an unchanged config. Serialized against
    /// other `load`/`stop` calls by the workers mutex.
    ///
    /// Removal only unregisters the stale host from the map under the lock;
    /// the actual join on its scrape loop (which can run as long as its
    /// current, uncancellable tick) happens in a spawned task after the lock
    /// is released, so a worker mid-scrape never stalls worker creation or
    /// reload within this same call, nor `worker_count` (spec §4.3, §5).
    pub async fn load(&self, config: CollectorConfig) {
        let mut hosts = flatten(&config);
        let mut workers = self.workers.lock().await;

        let stale_hosts: Vec<String> = workers
            .keys()
            .filter(|host| !hosts.contains_key(*host))
            .cloned()
            .collect();
        let mut stale = Vec::with_capacity(stale_hosts.len());
        for host in stale_hosts {
            if let Some(worker) = workers.remove(&host) {
                stale.push((host, worker));
            }
        }

        for (host, binding) in hosts.drain() {
            match workers.get(&host) {
                Some(worker) => worker.reload(binding).await,
                None => {
                    info!(host = %host, job = %binding.job.job, application = %binding.target.application, "add collector");
                    let worker = ScrapeWorker::spawn(binding, self.store.clone());
                    workers.insert(host, worker);
                }
            }
        }

        drop(workers);

        for (host, worker) in stale {
            tokio::spawn(async move {
                info!(host = %host, "delete collector");
                worker.stop().await;
            });
        }
    }

    /// Stops every worker and waits for all of them to exit. Further `load`
    /// calls after `stop` are undefined (spec §4.3).
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        for (_, worker) in workers.drain() {
            worker.stop().await;
        }
        info!("collector manager exit");
    }

    /// Number of live workers — used by tests and the API's target listing.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GoDuration, ScrapeJob, TargetConfig};
    use crate::store::moka_store::MokaStore;
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration;

    fn config(job_name: &str, hosts: &[&str]) -> CollectorConfig {
        CollectorConfig {
            scrape_configs: vec![ScrapeJob {
                job: job_name.to_string(),
                interval: GoDuration(Duration::from_secs(60)),
                expiration: GoDuration(Duration::from_secs(300)),
                enabled_profiles: vec!["heap".to_string()],
                path_profiles: StdHashMap::new(),
                targets: vec![TargetConfig {
                    application: "api".to_string(),
                    hosts: hosts.iter().map(|h| h.to_string()).collect(),
                    labels: StdHashMap::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn load_creates_one_worker_per_host() {
        let manager = Manager::new(Arc::new(MokaStore::new()));
        manager.load(config("j", &["h1:6060", "h2:6060"])).await;
        assert_eq!(manager.worker_count().await, 2);
        manager.stop().await;
    }

    #[tokio::test]
    async fn load_diffs_add_and_remove_hosts() {
        let manager = Manager::new(Arc::new(MokaStore::new()));
        manager.load(config("j", &["h1:6060", "h2:6060"])).await;
        manager.load(config("j", &["h1:6060", "h3:6060"])).await;
        assert_eq!(manager.worker_count().await, 2);
        manager.stop().await;
    }

    #[tokio::test]
    async fn load_is_idempotent_on_unchanged_config() {
        let manager = Manager::new(Arc::new(MokaStore::new()));
        let cfg = config("j", &["h1:6060"]);
        manager.load(cfg.clone()).await;
        manager.load(cfg).await;
        assert_eq!(manager.worker_count().await, 1);
        manager.stop().await;
    }

    #[tokio::test]
    async fn duplicate_host_across_jobs_keeps_first_binding() {
        let mut cfg = config("jobA", &["h1:6060"]);
        cfg.scrape_configs.push(ScrapeJob {
            job: "jobB".to_string(),
            interval: GoDuration(Duration::from_secs(60)),
            expiration: GoDuration(Duration::from_secs(300)),
            enabled_profiles: vec!["mutex".to_string()],
            path_profiles: StdHashMap::new(),
            targets: vec![TargetConfig {
                application: "other".to_string(),
                hosts: vec!["h1:6060".to_string()],
                labels: StdHashMap::new(),
            }],
        });

        let manager = Manager::new(Arc::new(MokaStore::new()));
        manager.load(cfg).await;
        assert_eq!(manager.worker_count().await, 1);
        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_removes_all_workers() {
        let manager = Manager::new(Arc::new(MokaStore::new()));
        manager.load(config("j", &["h1:6060", "h2:6060"])).await;
        manager.stop().await;
        assert_eq!(manager.worker_count().await, 0);
    }
}
