//! docbatch - concurrent document-to-Markdown conversion.
//!
//! Runs a bounded pool of workers over a queue of input documents. Each
//! document is handed to an ordered chain of extraction backends (MinerU,
//! pdftotext, Tesseract, custom commands); the first backend that returns
//! text wins. A shared cancellation token lets a run be stopped mid-flight
//! without corrupting already-written output.

pub mod backend;
pub mod cancel;
pub mod config;
pub mod device;
pub mod estimate;
pub mod history;
pub mod input;
pub mod output;
pub mod pool;

pub use backend::{Backend, BackendChain, BackendError, BackendResult, ExtractContext, ExtractOptions};
pub use cancel::{AbortSignal, CancellationToken, TokenState};
pub use config::{Config, ConfigError};
pub use device::{Device, DevicePreference, DeviceProbe, FixedProbe, SystemProbe};
pub use history::{ConversionRecord, History, HistoryError, HistoryStats};
pub use pool::{BatchRun, ConversionTask, PoolError, PoolEvent, StatusSnapshot, TaskStatus, WorkerPool};
