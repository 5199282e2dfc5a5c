//! Reference atmosphere and vertical metric coefficients.
//!
//! - [`ReferenceAtmosphere`]: analytic hydrostatic background state
//! - [`MetricState`]: layer thicknesses, vertical interpolation weights and
//!   the reference state sampled on the grid

mod metric_state;
mod reference;

pub use metric_state::MetricState;
pub use reference::ReferenceAtmosphere;
