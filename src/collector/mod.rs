//! The collector manager: the dynamic fleet of per-target scrape workers,
//! its hot-reloadable configuration lifecycle, and the scrape/parse/store
//! pipeline (spec §1, §4.2–§4.3). This is the core the rest of the crate
//! exists to support.

pub mod manager;
pub mod worker;

pub use manager::Manager;
pub use worker::{JobBinding, ScrapeWorker};
