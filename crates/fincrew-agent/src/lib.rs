//! Fincrew Agent - reasoning roles and the bounded role loop

pub mod decode;
pub mod role;
pub mod runtime;
pub mod throttle;

pub use decode::{decode_step, Decision};
pub use role::{render_template, BoundRole, Persona, RoleSpec, TemplateVars};
pub use runtime::{RoleError, RoleOutcome, RoleRuntime, RuntimeConfig};
pub use throttle::CallThrottle;
