//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `media_optimizer`: Orchestratore principale (walk → classify → dispatch)
//! - `task_optimizer`: Worker per singoli file
//! - `progress_tracker`: Gestione progress e riepilogo unificata
//! - `path_resolver`: Logica di calcolo path di output centralizzata

pub mod media_optimizer;
pub mod path_resolver;
pub mod progress_tracker;
pub mod task_optimizer;

#[cfg(test)]
pub(crate) mod testing;

pub use media_optimizer::MediaOptimizer;
pub use path_resolver::{DestinationClaims, PathResolver};
pub use progress_tracker::ProgressTracker;
pub use task_optimizer::TaskOptimizer;

pub use crate::cancel::CancelToken;
