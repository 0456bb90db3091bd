//! Validation passes
//!
//! Each pass checks one aspect of a [`WorkflowConfig`]:
//! - shape: field value kinds, identifiers, option schemas
//! - permissions: strict read-only gate
//! - triggers: per-kind trigger shape rules
//! - consistency: cross-field rules from the rule table (warnings)
//!
//! Consistency runs last, after every per-field pass.
//!
//! [`WorkflowConfig`]: crate::workflow::WorkflowConfig

pub mod consistency;
pub mod permissions;
pub mod shape;
pub mod triggers;

pub use consistency::{validate_consistency, validate_imported_toolsets};
pub use permissions::validate_permissions;
pub use shape::{validate_fragment_keys, validate_shape, OptionSchemas};
pub use triggers::validate_triggers;

use crate::errors::Violation;
use crate::field::Section;

/// Shared handling for a section whose container has the wrong type
pub(crate) fn malformed_section<T>(
    section: &Section<T>,
    location: &str,
    expected: &str,
    out: &mut Vec<Violation>,
) -> bool {
    if let Section::Malformed { found } = section {
        out.push(Violation::WrongShape {
            location: location.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        });
        true
    } else {
        false
    }
}
