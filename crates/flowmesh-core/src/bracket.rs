//! Hierarchical substream tracking (spec §4.1).
//!
//! A [`BracketManager`] is optionally attached to an input port by processes
//! that care about nesting. It maintains a depth counter and signals an
//! `UnbalancedBracket` process-level error when a close arrives at depth 0 —
//! the scenario spelled out in spec §8 scenario 6.

use crate::error::{codes, CoreError, ErrorCategory};
use crate::ip::IpKind;

/// Tracks nested Open/Close bracket depth for one input port.
#[derive(Debug, Default)]
pub struct BracketManager {
    depth: usize,
}

impl BracketManager {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Feed one IP kind through the manager. Only `OpenBracket`/`CloseBracket`
    /// affect depth; other kinds are no-ops and always succeed.
    pub fn observe(&mut self, kind: IpKind) -> Result<(), CoreError> {
        match kind {
            IpKind::OpenBracket => {
                self.depth += 1;
                Ok(())
            }
            IpKind::CloseBracket => {
                if self.depth == 0 {
                    return Err(CoreError::new(
                        codes::UNBALANCED_BRACKET,
                        ErrorCategory::ProcessFailure,
                        "close bracket observed at depth 0",
                    ));
                }
                self.depth -= 1;
                Ok(())
            }
            IpKind::Normal | IpKind::InitialInformationPacket => Ok(()),
        }
    }
}
