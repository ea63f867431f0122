//! Attaches a recorded execution profile to a target binary's recovered
//! control-flow graphs: resolves which binary function each profile record
//! describes, then propagates its counts onto that function's CFG.
//!
//! The pipeline is four components run in sequence: [`name_index`] and
//! [`hash_index`] build lookup tables, [`matcher`] runs the stage cascade
//! that binds profile records to binary functions (falling back to
//! [`similarity`] when configured), and [`propagator`] stamps the bound
//! counts onto each function. [`reader`] is the thin orchestration layer
//! that runs all of the above; most callers only need
//! [`reader::preprocess_profile`] and [`reader::read_profile`].

pub mod binary_context;
pub mod config;
pub mod error;
pub mod hash_index;
pub mod matcher;
pub mod name_index;
pub mod profile_document;
pub mod propagator;
pub mod reader;
pub mod similarity;
pub mod util;

pub use binary_context::{BinaryContext, BinaryFunction, FunctionId};
pub use config::Options;
pub use error::Error;
pub use matcher::MatchTables;
pub use profile_document::ProfileDocument;
pub use propagator::{NeverInfer, StaleProfileInferer};
pub use reader::{may_have_profile_data, preprocess_profile, read_profile, uses_event, Stats};
