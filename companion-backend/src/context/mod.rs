//! Context assembly: the bounded memory block and the system preamble.

pub mod assembler;
pub mod budget;
pub mod cache;
pub mod preamble;

pub use assembler::{is_light_message, ContextAssembler};
pub use budget::{fit_to_budget, Section, SectionKind, TRUNCATION_MARKER};
pub use cache::ContextCache;
pub use preamble::PreambleData;
