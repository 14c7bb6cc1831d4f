//! # Takeout Organizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione, profilo e validazione parametri
//! - `error`: Tassonomia degli errori ed exit code
//! - `file_manager`: Walk lazy dell'albero di input
//! - `classifier`: Media / pass-through / skip per ogni file
//! - `encoder`: Trait `Encoder` e backend ffmpeg
//! - `transcoder`: Encode con timeout e rename-into-place
//! - `output_writer`: Copia atomica, directory e politica di collisione
//! - `cleanup`: Cancellazione degli originali dopo una scrittura riuscita
//! - `optimizer`: Orchestratore concorrente del comando `optimize`
//! - `organizer`: Comando `organize` (rinomina per data di scatto)
//! - `embedded_date`: Data di scatto incorporata (ffprobe / exiftool)
//! - `cancel`: Token di cancellazione condiviso con le copie bloccanti
//! - `progress` / `json_output`: Riepilogo, progress bar ed eventi JSON
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use takeout_organizer::{Config, FfmpegEncoder, MediaOptimizer};
//!
//! # async fn example() -> Result<(), takeout_organizer::OptimizeError> {
//! let config = Config {
//!     input_dir: "Takeout".into(),
//!     output_dir: "Optimized".into(),
//!     ..Default::default()
//! };
//! let encoder = Arc::new(FfmpegEncoder::from_config(&config)?);
//! let summary = MediaOptimizer::new(config, encoder)?.run().await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod classifier;
pub mod cleanup;
pub mod config;
pub mod embedded_date;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod organizer;
pub mod output_writer;
pub mod progress;
pub mod results;
pub mod tool_resolver;
pub mod transcoder;

pub use config::{Config, ConflictPolicy};
pub use encoder::{Encoder, FfmpegEncoder};
pub use error::OptimizeError;
pub use optimizer::{CancelToken, MediaOptimizer};
pub use organizer::Organizer;
pub use progress::RunSummary;
pub use results::{Outcome, ProcessingResult};
