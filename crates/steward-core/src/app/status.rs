//! Status view: run counts by status.

use serde::Serialize;

use crate::domain::RunStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub pending: usize,
    pub leased: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl RunCounts {
    pub fn set(&mut self, status: RunStatus, n: usize) {
        let slot = match status {
            RunStatus::Pending => &mut self.pending,
            RunStatus::Leased => &mut self.leased,
            RunStatus::Succeeded => &mut self.succeeded,
            RunStatus::Failed => &mut self.failed,
            RunStatus::Abandoned => &mut self.abandoned,
        };
        *slot = n;
    }

    pub fn total(&self) -> usize {
        self.pending + self.leased + self.succeeded + self.failed + self.abandoned
    }
}
