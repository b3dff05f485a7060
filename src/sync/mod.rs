mod reconcile;
mod sweep;

pub use reconcile::reconcile;
pub use sweep::{staleness_boundary, sweep};
