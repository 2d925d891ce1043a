//! Scrape Worker (spec §4.2): the long-lived agent responsible for scraping
//! one host. Owns no store of its own — only a handle to the Store Façade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::{build_profile_type_configs, ProfileTypeConfig, ScrapeJob, TargetConfig};
use crate::error::CollectorError;
use crate::profile;
use crate::store::{Label, ProfileMeta, ProfileStore};

const TRACE_PROFILE_TYPE: &str = "trace";

/// One `(ScrapeJob, Target, host)` tuple — the Manager's unit of diffing
/// and the worker's full identity (spec §3, `JobBinding`).
#[derive(Debug, Clone, PartialEq)]
pub struct JobBinding {
    pub job: ScrapeJob,
    pub target: TargetConfig,
    pub host: String,
}

#[derive(Debug, Clone)]
struct Snapshot {
    binding: JobBinding,
    profiles: HashMap<String, ProfileTypeConfig>,
}

impl Snapshot {
    fn new(binding: JobBinding) -> Self {
        let profiles = build_profile_type_configs(&binding.job);
        Self { binding, profiles }
    }
}

/// Scrapes one host on a timer, parses what it fetches, and persists the
/// result through a shared [`ProfileStore`].
pub struct ScrapeWorker {
    host: String,
    snapshot: Arc<RwLock<Snapshot>>,
    stop_tx: mpsc::Sender<()>,
    reconfig_tx: mpsc::Sender<Duration>,
    handle: JoinHandle<()>,
}

impl ScrapeWorker {
    /// Starts the worker: one immediate scrape, then a periodic timer at
    /// `binding.job.interval` (spec §4.2, `start`).
    pub fn spawn(binding: JobBinding, store: Arc<dyn ProfileStore>) -> Self {
        let host = binding.host.clone();
        let interval = Duration::from(binding.job.interval);
        let snapshot = Arc::new(RwLock::new(Snapshot::new(binding)));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (reconfig_tx, reconfig_rx) = mpsc::channel(8);

        info!(host = %host, "worker start");
        let handle = tokio::spawn(scrape_loop(
            host.clone(),
            snapshot.clone(),
            store,
            interval,
            stop_rx,
            reconfig_rx,
        ));

        Self {
            host,
            snapshot,
            stop_tx,
            reconfig_tx,
            handle,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current binding snapshot, used by the Manager to test semantic
    /// equality before deciding whether a reload is a no-op.
    pub async fn binding(&self) -> JobBinding {
        self.snapshot.read().await.binding.clone()
    }

    /// Rebuilds the profile-type map from `new_binding`; a no-op if the
    /// binding is unchanged (spec §4.3, idempotent Load). If the interval
    /// changed, the new period is pushed to the scrape loop; an in-flight
    /// scrape is unaffected and the new period applies after the current
    /// tick (spec §4.2, `reload`).
    pub async fn reload(&self, new_binding: JobBinding) {
        let mut guard = self.snapshot.write().await;
        if guard.binding == new_binding {
            return;
        }
        info!(host = %self.host, job = %new_binding.job.job, "worker reload");
        let old_interval = Duration::from(guard.binding.job.interval);
        let new_interval = Duration::from(new_binding.job.interval);
        *guard = Snapshot::new(new_binding);
        drop(guard);

        if old_interval != new_interval {
            // The reconfig channel is bounded (spec §5); coalesce by
            // overwriting rather than blocking the reloading caller.
            if self.reconfig_tx.try_send(new_interval).is_err() {
                warn!(host = %self.host, "reconfig channel full, dropping stale interval update");
            }
        }
    }

    /// Closes the stop signal and joins the scrape loop task (spec §4.2, `stop`).
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        if let Err(err) = self.handle.await {
            error!(host = %self.host, error = %err, "worker task did not exit cleanly");
        }
    }
}

async fn scrape_loop(
    host: String,
    snapshot: Arc<RwLock<Snapshot>>,
    store: Arc<dyn ProfileStore>,
    interval: Duration,
    mut stop_rx: mpsc::Receiver<()>,
    mut reconfig_rx: mpsc::Receiver<Duration>,
) {
    let http = reqwest::Client::new();
    scrape(&host, &snapshot, &store, &http).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!(host = %host, "scrape loop exit");
                return;
            }
            Some(new_interval) = reconfig_rx.recv() => {
                ticker = tokio::time::interval(new_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
            }
            _ = ticker.tick() => {
                scrape(&host, &snapshot, &store, &http).await;
            }
        }
    }
}

/// One tick: fans out one fetch per enabled profile type and waits for all
/// of them. Ticks do not overlap — this function is the tick's barrier
/// (spec §4.2, §5).
async fn scrape(
    host: &str,
    snapshot: &Arc<RwLock<Snapshot>>,
    store: &Arc<dyn ProfileStore>,
    http: &reqwest::Client,
) {
    let (binding, enabled): (JobBinding, Vec<(String, ProfileTypeConfig)>) = {
        let guard = snapshot.read().await;
        let enabled = guard
            .profiles
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(ty, cfg)| (ty.clone(), cfg.clone()))
            .collect();
        (guard.binding.clone(), enabled)
    };

    info!(host = %host, job = %binding.job.job, "collector start scrape");

    let mut tasks = tokio::task::JoinSet::new();
    for (profile_type, cfg) in enabled {
        let binding = binding.clone();
        let store = store.clone();
        let http = http.clone();
        tasks.spawn(async move {
            fetch(&binding, &profile_type, &cfg, &store, &http).await;
        });
    }
    while tasks.join_next().await.is_some() {}
}

/// One fetch: HTTP GET, status check, full-body read, then dispatch to the
/// trace or non-trace persist path (spec §4.2).
async fn fetch(
    binding: &JobBinding,
    profile_type: &str,
    cfg: &ProfileTypeConfig,
    store: &Arc<dyn ProfileStore>,
    http: &reqwest::Client,
) {
    let url = format!("http://{}{}", binding.host, cfg.path);
    info!(job = %binding.job.job, host = %binding.host, profile_type, url = %url, "collector start fetch");

    let response = match http.get(&url).header("User-Agent", "").send().await {
        Ok(resp) => resp,
        Err(err) => {
            let fetch_err = CollectorError::Fetch {
                url: url.clone(),
                reason: err.to_string(),
            };
            error!(job = %binding.job.job, host = %binding.host, profile_type, url = %url, error = %fetch_err, "http request error");
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let fetch_err = CollectorError::Fetch {
            url: url.clone(),
            reason: format!("status {status}"),
        };
        error!(job = %binding.job.job, host = %binding.host, profile_type, url = %url, error = %fetch_err, "http response status not in [200,300)");
        return;
    }

    let bytes = match response.bytes().await {
        Ok(b) => b.to_vec(),
        Err(err) => {
            let fetch_err = CollectorError::Fetch {
                url: url.clone(),
                reason: err.to_string(),
            };
            error!(job = %binding.job.job, host = %binding.host, profile_type, url = %url, error = %fetch_err, "read response body error");
            return;
        }
    };

    let ttl = Duration::from(binding.job.expiration);
    let result = if profile_type == TRACE_PROFILE_TYPE {
        persist_trace(binding, profile_type, bytes, store, ttl).await
    } else {
        persist_profile(binding, profile_type, bytes, store, ttl).await
    };

    if let Err(err) = result {
        error!(job = %binding.job.job, host = %binding.host, profile_type, error = %err, "analysis result error");
    }
}

async fn persist_profile(
    binding: &JobBinding,
    profile_type: &str,
    bytes: Vec<u8>,
    store: &Arc<dyn ProfileStore>,
    ttl: Duration,
) -> crate::error::Result<()> {
    let mut parsed = profile::decode(&bytes)?;
    parsed.set_mapping_owner(&binding.job.job);
    let payload_bytes = parsed.to_bytes();

    let display_name = format!("{}-{}", binding.job.job, profile_type);
    let profile_id = store
        .save_payload(&display_name, payload_bytes, ttl)
        .await
        .map_err(|e| CollectorError::Persist(e.to_string()))?;

    let timestamp_ms = Utc::now().timestamp_millis();
    let labels: Vec<Label> = binding
        .target
        .labels
        .iter()
        .map(|(k, v)| Label {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();

    let multi = parsed.sample_types.len() > 1;
    let metas: Vec<ProfileMeta> = parsed
        .sample_types
        .iter()
        .enumerate()
        .map(|(i, st)| ProfileMeta {
            profile_id: profile_id.clone(),
            timestamp_ms,
            duration_ns: Some(parsed.duration_nanos),
            sample_type: if multi {
                format!("{profile_type}_{}", st.sample_type)
            } else {
                profile_type.to_string()
            },
            sample_type_unit: Some(st.unit.clone()),
            profile_type: profile_type.to_string(),
            job: binding.job.job.clone(),
            host: binding.host.clone(),
            application: binding.target.application.clone(),
            labels: labels.clone(),
            value: Some(parsed.column_sum(i)),
        })
        .collect();

    store
        .save_metas(metas, ttl)
        .await
        .map_err(|e| CollectorError::Persist(e.to_string()))
}

async fn persist_trace(
    binding: &JobBinding,
    profile_type: &str,
    bytes: Vec<u8>,
    store: &Arc<dyn ProfileStore>,
    ttl: Duration,
) -> crate::error::Result<()> {
    let display_name = format!("{}-{}", binding.job.job, profile_type);
    let profile_id = store
        .save_payload(&display_name, bytes, ttl)
        .await
        .map_err(|e| CollectorError::Persist(e.to_string()))?;

    let labels: Vec<Label> = binding
        .target
        .labels
        .iter()
        .map(|(k, v)| Label {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();

    let meta = ProfileMeta {
        profile_id,
        timestamp_ms: Utc::now().timestamp_millis(),
        duration_ns: None,
        sample_type: profile_type.to_string(),
        sample_type_unit: None,
        profile_type: profile_type.to_string(),
        job: binding.job.job.clone(),
        host: binding.host.clone(),
        application: binding.target.application.clone(),
        labels,
        value: None,
    };

    store
        .save_metas(vec![meta], ttl)
        .await
        .map_err(|e| CollectorError::Persist(e.to_string()))
}
