//! Declarative collector configuration: the YAML schema, built-in profile-type
//! defaults, and the job-config → per-host binding derivation described in
//! spec §3–§4.3. [`loader`] owns reading the file and watching it for changes.

pub mod duration;
pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use duration::GoDuration;

/// Crate-wide default scrape interval, applied when a job omits `interval`.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
/// Crate-wide default item TTL, applied when a job omits `expiration`.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(300);

/// The sentinel that enables every profile type in `enabled-profiles`.
pub const ALL_SENTINEL: &str = "all";

/// All profile types the collector knows how to scrape, in the order the
/// built-in defaults table in spec §6 lists them.
pub const PROFILE_TYPES: &[&str] = &[
    "profile",
    "mutex",
    "heap",
    "goroutine",
    "allocs",
    "block",
    "threadcreate",
    "trace",
];

fn builtin_default_path(profile_type: &str) -> Option<&'static str> {
    Some(match profile_type {
        "profile" => "/debug/pprof/profile?seconds=10",
        "mutex" => "/debug/pprof/mutex",
        "heap" => "/debug/pprof/heap",
        "goroutine" => "/debug/pprof/goroutine",
        "allocs" => "/debug/pprof/allocs",
        "block" => "/debug/pprof/block",
        "threadcreate" => "/debug/pprof/threadcreate",
        "trace" => "/debug/pprof/trace?seconds=10",
        _ => return None,
    })
}

/// Top-level collector config: `scrape-configs` in the YAML file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct CollectorConfig {
    #[serde(rename = "scrape-configs", default)]
    pub scrape_configs: Vec<ScrapeJob>,
}

/// One `scrape-configs` entry: a job's scrape cadence, retention, enabled
/// profile types, and the targets it applies to.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScrapeJob {
    pub job: String,
    #[serde(default = "default_interval")]
    pub interval: GoDuration,
    #[serde(default = "default_expiration")]
    pub expiration: GoDuration,
    #[serde(rename = "enabled-profiles", default)]
    pub enabled_profiles: Vec<String>,
    #[serde(rename = "path-profiles", default)]
    pub path_profiles: HashMap<String, String>,
    #[serde(rename = "target-configs", default)]
    pub targets: Vec<TargetConfig>,
}

fn default_interval() -> GoDuration {
    GoDuration(DEFAULT_INTERVAL)
}

fn default_expiration() -> GoDuration {
    GoDuration(DEFAULT_EXPIRATION)
}

/// One target group: an application name, its hosts, and free-form labels
/// attached to every profile scraped from those hosts.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct TargetConfig {
    pub application: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Per-profile-type fetch config derived from a [`ScrapeJob`]: the resolved
/// path to GET and whether the type is enabled for this job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTypeConfig {
    pub path: String,
    pub enabled: bool,
}

/// Builds the per-profile-type fetch map for a job per spec §3
/// (`ProfileTypeConfig`, derived per worker):
///
/// - start from built-in defaults;
/// - `enabled-profiles` empty ⇒ every type enabled;
/// - otherwise each named type (plus the `all` sentinel) is enabled;
///   unknown names are ignored;
/// - `path-profiles` overrides replace only the named type's path.
pub fn build_profile_type_configs(job: &ScrapeJob) -> HashMap<String, ProfileTypeConfig> {
    let mut configs: HashMap<String, ProfileTypeConfig> = PROFILE_TYPES
        .iter()
        .map(|&ty| {
            (
                ty.to_string(),
                ProfileTypeConfig {
                    path: builtin_default_path(ty).unwrap().to_string(),
                    enabled: false,
                },
            )
        })
        .collect();

    let enable_all = job.enabled_profiles.is_empty()
        || job.enabled_profiles.iter().any(|p| p == ALL_SENTINEL);

    if enable_all {
        for cfg in configs.values_mut() {
            cfg.enabled = true;
        }
    } else {
        for name in &job.enabled_profiles {
            if let Some(cfg) = configs.get_mut(name) {
                cfg.enabled = true;
            }
        }
    }

    for (profile_type, path) in &job.path_profiles {
        if let Some(cfg) = configs.get_mut(profile_type) {
            cfg.path = path.clone();
        }
    }

    configs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(enabled: &[&str]) -> ScrapeJob {
        ScrapeJob {
            job: "j".to_string(),
            interval: default_interval(),
            expiration: default_expiration(),
            enabled_profiles: enabled.iter().map(|s| s.to_string()).collect(),
            path_profiles: HashMap::new(),
            targets: vec![],
        }
    }

    #[test]
    fn empty_enabled_profiles_enables_all() {
        let cfgs = build_profile_type_configs(&job(&[]));
        assert!(cfgs.values().all(|c| c.enabled));
        assert_eq!(cfgs.len(), PROFILE_TYPES.len());
    }

    #[test]
    fn single_named_profile_enables_only_that_one() {
        let cfgs = build_profile_type_configs(&job(&["heap"]));
        assert!(cfgs["heap"].enabled);
        assert!(!cfgs["mutex"].enabled);
        assert!(!cfgs["trace"].enabled);
    }

    #[test]
    fn all_sentinel_enables_every_type_including_trace() {
        let cfgs = build_profile_type_configs(&job(&[ALL_SENTINEL, "trace"]));
        assert!(cfgs.values().all(|c| c.enabled));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let cfgs = build_profile_type_configs(&job(&["heap", "bogus"]));
        assert!(cfgs["heap"].enabled);
        assert_eq!(cfgs.len(), PROFILE_TYPES.len());
    }

    #[test]
    fn path_override_replaces_only_that_type() {
        let mut j = job(&["heap"]);
        j.path_profiles
            .insert("heap".to_string(), "/custom/heap".to_string());
        let cfgs = build_profile_type_configs(&j);
        assert_eq!(cfgs["heap"].path, "/custom/heap");
        assert_eq!(cfgs["mutex"].path, "/debug/pprof/mutex");
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
scrape-configs:
  - job: test
    interval: 30s
    expiration: 5m
    target-configs:
      - application: api
        hosts: ["h1:6060"]
"#;
        let cfg: CollectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scrape_configs.len(), 1);
        assert_eq!(cfg.scrape_configs[0].job, "test");
        assert_eq!(
            Duration::from(cfg.scrape_configs[0].interval),
            Duration::from_secs(30)
        );
    }
}
