use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Relative reference from one stage to another, resolved against the
/// pipeline order every time a stage executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineLink {
    First,
    Second,
    Third,
    Previous,
    PreviousMinusOne,
    Current,
    Last,
}

impl PipelineLink {
    pub const ALL: [PipelineLink; 7] = [
        PipelineLink::First,
        PipelineLink::Second,
        PipelineLink::Third,
        PipelineLink::Previous,
        PipelineLink::PreviousMinusOne,
        PipelineLink::Current,
        PipelineLink::Last,
    ];

    /// Index of the stage this link names, seen from `current` in a
    /// pipeline of `len` stages.
    pub fn resolve(self, current: usize, len: usize) -> Result<usize> {
        let index = match self {
            PipelineLink::First => Some(0),
            PipelineLink::Second => Some(1),
            PipelineLink::Third => Some(2),
            PipelineLink::Previous => current.checked_sub(1),
            PipelineLink::PreviousMinusOne => current.checked_sub(2),
            PipelineLink::Current => Some(current),
            PipelineLink::Last => len.checked_sub(1),
        };

        match index {
            Some(index) if index < len && current < len => Ok(index),
            _ => Err(RenderError::LinkOutOfBounds {
                link: self,
                current,
                len,
            }),
        }
    }
}

impl Default for PipelineLink {
    fn default() -> Self {
        PipelineLink::Current
    }
}
