//! End-to-end scrape → parse → store scenarios, literally mirroring the
//! collector's testable properties: a multi-sample-type heap scrape, a raw
//! trace scrape, a failed scrape, and a two-host config diff.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use profcollect::collector::Manager;
use profcollect::config::{CollectorConfig, GoDuration, ScrapeJob, TargetConfig};
use profcollect::profile::proto::{Mapping, Profile as RawProfile, Sample, ValueType};
use profcollect::store::moka_store::MokaStore;
use profcollect::store::ProfileStore;

/// Accepts exactly one connection and answers every request on it with a
/// fixed status and body. Good enough for one worker tick.
async fn serve_fixture(status: u16, body: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |_req: Request<Incoming>| {
                let body = body.clone();
                async move {
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::from(body)))
                            .unwrap(),
                    )
                }
            });
            let _ = http1::Builder::new().serve_connection(io, svc).await;
        }
    });
    addr
}

fn heap_payload_four_sample_types() -> Vec<u8> {
    let mut p = RawProfile {
        string_table: vec!["".to_string()],
        duration_nanos: 1_000_000_000,
        mapping: vec![Mapping {
            id: 1,
            ..Default::default()
        }],
        ..Default::default()
    };
    let count = p.intern("count");
    let bytes_unit = p.intern("bytes");
    let alloc_objects = p.intern("alloc_objects");
    let alloc_space = p.intern("alloc_space");
    let inuse_objects = p.intern("inuse_objects");
    let inuse_space = p.intern("inuse_space");
    p.sample_type = vec![
        ValueType {
            r#type: alloc_objects,
            unit: count,
        },
        ValueType {
            r#type: alloc_space,
            unit: bytes_unit,
        },
        ValueType {
            r#type: inuse_objects,
            unit: count,
        },
        ValueType {
            r#type: inuse_space,
            unit: bytes_unit,
        },
    ];
    p.sample = vec![
        Sample {
            value: vec![40, 80, 120, 160],
            ..Default::default()
        },
        Sample {
            value: vec![60, 120, 180, 240],
            ..Default::default()
        },
    ];
    p.encode_bytes()
}

fn single_host_config(job_name: &str, addr: SocketAddr, enabled: &[&str]) -> CollectorConfig {
    CollectorConfig {
        scrape_configs: vec![ScrapeJob {
            job: job_name.to_string(),
            interval: GoDuration(Duration::from_secs(3600)),
            expiration: GoDuration(Duration::from_secs(300)),
            enabled_profiles: enabled.iter().map(|s| s.to_string()).collect(),
            path_profiles: HashMap::new(),
            targets: vec![TargetConfig {
                application: "api".to_string(),
                hosts: vec![addr.to_string()],
                labels: HashMap::new(),
            }],
        }],
    }
}

#[tokio::test]
async fn heap_scrape_persists_one_payload_and_four_metas() {
    let addr = serve_fixture(200, heap_payload_four_sample_types()).await;

    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Manager::new(store.clone());
    manager
        .load(single_host_config("jobA", addr, &["heap"]))
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let window_start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let window_end = chrono::Utc::now() + chrono::Duration::minutes(1);

    let expected = [
        ("heap_alloc_objects", 100),
        ("heap_alloc_space", 200),
        ("heap_inuse_objects", 300),
        ("heap_inuse_space", 400),
    ];
    let mut profile_id = None;
    for (sample_type, value) in expected {
        let metas = store
            .list_metas(sample_type, window_start, window_end, &[])
            .await
            .unwrap();
        assert_eq!(metas.len(), 1, "expected exactly one meta for {sample_type}");
        assert_eq!(metas[0].value, Some(value));
        profile_id = Some(metas[0].profile_id.clone());
    }

    let payload = store.get_payload(&profile_id.unwrap()).await.unwrap();
    assert_eq!(payload.display_name, "jobA-heap");

    manager.stop().await;
}

#[tokio::test]
async fn trace_scrape_persists_raw_bytes_and_bare_meta() {
    let body = vec![9u8; 500];
    let addr = serve_fixture(200, body).await;

    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Manager::new(store.clone());
    manager
        .load(single_host_config("jobB", addr, &["trace"]))
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let window_start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let window_end = chrono::Utc::now() + chrono::Duration::minutes(1);
    let metas = store
        .list_metas("trace", window_start, window_end, &[])
        .await
        .unwrap();
    assert_eq!(metas.len(), 1);
    assert!(metas[0].duration_ns.is_none());
    assert!(metas[0].value.is_none());

    let payload = store.get_payload(&metas[0].profile_id).await.unwrap();
    assert_eq!(payload.display_name, "jobB-trace");
    assert_eq!(payload.bytes.len(), 500);

    manager.stop().await;
}

#[tokio::test]
async fn failed_scrape_persists_nothing() {
    let addr = serve_fixture(503, Vec::new()).await;

    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Manager::new(store.clone());
    manager
        .load(single_host_config("jobC", addr, &["heap"]))
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let window_start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let window_end = chrono::Utc::now() + chrono::Duration::minutes(1);
    assert!(store
        .list_applications()
        .await
        .unwrap()
        .is_empty());
    let metas = store
        .list_metas("heap", window_start, window_end, &[])
        .await
        .unwrap();
    assert!(metas.is_empty());

    manager.stop().await;
}

#[tokio::test]
async fn two_host_config_diff_removes_and_adds_workers() {
    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Manager::new(store);

    let mut cfg = CollectorConfig {
        scrape_configs: vec![ScrapeJob {
            job: "j".to_string(),
            interval: GoDuration(Duration::from_secs(3600)),
            expiration: GoDuration(Duration::from_secs(300)),
            enabled_profiles: vec!["heap".to_string()],
            path_profiles: HashMap::new(),
            targets: vec![TargetConfig {
                application: "api".to_string(),
                hosts: vec!["127.0.0.1:19001".to_string(), "127.0.0.1:19002".to_string()],
                labels: HashMap::new(),
            }],
        }],
    };
    manager.load(cfg.clone()).await;
    assert_eq!(manager.worker_count().await, 2);

    cfg.scrape_configs[0].targets[0].hosts =
        vec!["127.0.0.1:19001".to_string(), "127.0.0.1:19003".to_string()];
    manager.load(cfg).await;
    assert_eq!(manager.worker_count().await, 2);

    manager.stop().await;
}

#[tokio::test]
async fn config_watcher_reload_updates_worker_set() {
    use profcollect::config::loader::ConfigWatcher;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.yml");
    std::fs::write(
        &path,
        "scrape-configs:\n  - job: test\n    interval: 1h\n    expiration: 5m\n    enabled-profiles: [heap]\n    target-configs:\n      - application: api\n        hosts: [\"127.0.0.1:19101\"]\n",
    )
    .unwrap();

    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Arc::new(Manager::new(store));
    let reload_manager = manager.clone();

    let _watcher = ConfigWatcher::watch(&path, move |config| {
        let manager = reload_manager.clone();
        async move {
            manager.load(config).await;
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.worker_count().await, 1);

    std::fs::write(
        &path,
        "scrape-configs:\n  - job: change\n    interval: 1h\n    expiration: 5m\n    enabled-profiles: [heap]\n    target-configs:\n      - application: api\n        hosts: [\"127.0.0.1:19101\", \"127.0.0.1:19102\"]\n",
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.worker_count().await, 2);

    manager.stop().await;
}
