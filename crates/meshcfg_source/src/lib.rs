//! meshcfg sources
//!
//! Turns configuration backends into the canonical event stream defined in
//! `meshcfg_event`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐
//! │ Informer (kube)  │────▶│   Watcher     │──┐
//! └──────────────────┘     │ (per schema)  │  │     ┌─────────────┐
//!                          └───────────────┘  ├────▶│   Handler   │
//! ┌──────────────────┐     ┌───────────────┐  │     │ (downstream)│
//! │ Directory tree   │────▶│  KubeSource   │──┘     └─────────────┘
//! │ (FsSource walk)  │     │ (in-memory)   │
//! └──────────────────┘     └───────────────┘
//! ```
//!
//! - **apiserver**: generic watch adapter over an injected informer capability
//! - **inmemory**: reconciled per-file resource store that emits diffs
//! - **fs**: directory snapshot source driven by reload triggers

pub mod apiserver;
pub mod error;
pub mod fs;
pub mod inmemory;
pub mod metrics;
pub mod revision;

pub use apiserver::{
    Adapter, ApiServerSource, DeletedObject, Informer, InformerHandler, ObjectMeta, Recovery,
    SchemaWatcher, Watcher,
};
pub use error::{Result, SourceError};
pub use fs::{FsOptions, FsSource, ReloadReport, ReloadTrigger};
pub use inmemory::KubeSource;
pub use metrics::SOURCE_METRICS;
pub use revision::{RevisionFilter, REVISION_LABEL};
