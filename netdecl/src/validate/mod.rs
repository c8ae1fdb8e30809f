//! Semantic validation of a resolved [`State`].
//!
//! Checks run device by device in dependency order and stop at the first
//! failure. Value ranges come first, then cross-field structure, then what
//! the selected backend can express.

pub mod capability;
mod ranges;
mod structure;

use tracing::debug;

use crate::context::EngineContext;
use crate::error::{Error, Location, Result};
use crate::state::{ResolvedDevice, State};

/// Validate every device; the first problem wins.
pub fn validate(state: &State, ctx: &EngineContext) -> Result<()> {
    for dev in state.devices() {
        ranges::check(dev)?;
        structure::check(state, dev)?;
        capability::check(state, dev, ctx)?;
    }
    debug!(devices = state.len(), "validated");
    Ok(())
}

/// An error about `dev`, positioned at `field` when it came from a document.
pub(crate) fn fail(dev: &ResolvedDevice, field: &str, message: impl AsRef<str>) -> Error {
    Error::semantic(
        format!("{}: {}", dev.id(), message.as_ref()),
        location(dev, field),
    )
}

pub(crate) fn location(dev: &ResolvedDevice, field: &str) -> Option<Location> {
    dev.def.provenance.location(field)
}
