//! # kx-access
//!
//! The single gate every notebook-scoped operation passes through before
//! touching storage (§4.B). Two checks compose here: the tier lattice
//! (`Existence < Read < ReadWrite < Admin`) granted per author, and label
//! dominance for classification-scoped operations (job claim, subscription
//! approval). Denial is leak-resistant: a caller who holds no grant at all
//! is told `NotFound`, never `Forbidden` — so probing for a notebook's
//! existence gives nothing away.

pub mod gate;
pub mod sharing;

pub use gate::Gate;
