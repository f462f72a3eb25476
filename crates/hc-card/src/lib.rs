//! # hc-card
//!
//! In-memory model of a binned template-fit measurement and its datacard
//! serialization: bins, observations, processes and systematics, selector
//! views over the model, shape-template extraction with placeholder
//! substitution, bin-by-bin statistical uncertainties, and the derived
//! pass/fail efficiency with propagated error.

pub mod binbybin;
pub mod card;
pub mod efficiency;
pub mod registry;
pub mod select;
pub mod shapes;
pub mod store;
pub mod syst;
pub mod template;

pub use binbybin::BinByBinFactory;
pub use card::{read_card, write_card};
pub use efficiency::{efficiency, Efficiency};
pub use registry::{Bin, Observation, Process, Registry, Systematic};
pub use select::Selection;
pub use store::{ShapeContainer, TemplateStore};
pub use syst::{EffectSpec, SystKind};
