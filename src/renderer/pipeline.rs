use super::link::PipelineLink;
use super::stage::StageHandle;
use crate::error::{RenderError, Result};

/// Ordered list of stage handles plus the index of the executing stage.
///
/// Apart from appending, rotation is the only way the order changes.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<StageHandle>,
    current: Option<usize>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[StageHandle] {
        &self.stages
    }

    pub fn push(&mut self, stage: StageHandle) {
        self.stages.push(stage);
    }

    pub fn get(&self, index: usize) -> Option<StageHandle> {
        self.stages.get(index).copied()
    }

    pub fn stage_at(&self, index: usize) -> Result<StageHandle> {
        self.get(index).ok_or(RenderError::HandleOutOfBounds {
            kind: "pipeline stage",
            index,
            capacity: self.stages.len(),
        })
    }

    /// `[A, B, C]` becomes `[B, C, A]`.
    pub fn rotate_left(&mut self) {
        if !self.stages.is_empty() {
            self.stages.rotate_left(1);
        }
    }

    /// Inverse of [`rotate_left`](Self::rotate_left).
    pub fn rotate_right(&mut self) {
        if !self.stages.is_empty() {
            self.stages.rotate_right(1);
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn set_current(&mut self, index: Option<usize>) {
        self.current = index;
    }

    /// Index of the stage `link` names from the stage at `current`.
    pub fn resolve(&self, link: PipelineLink, current: usize) -> Result<usize> {
        link.resolve(current, self.stages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Handle;

    fn pipeline(n: usize) -> Pipeline {
        let mut pipeline = Pipeline::new();
        for i in 0..n {
            pipeline.push(Handle::new(i));
        }
        pipeline
    }

    fn order(pipeline: &Pipeline) -> Vec<usize> {
        pipeline.stages().iter().map(|h| h.index()).collect()
    }

    #[test]
    fn rotate_left_moves_head_to_tail() {
        let mut p = pipeline(3);
        p.rotate_left();
        assert_eq!(order(&p), vec![1, 2, 0]);
    }

    #[test]
    fn rotations_are_inverse() {
        let mut p = pipeline(5);
        for _ in 0..3 {
            p.rotate_left();
        }
        for _ in 0..3 {
            p.rotate_right();
        }
        assert_eq!(order(&p), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn resolve_maps_links_to_handles() {
        let p = pipeline(3);
        assert_eq!(p.resolve(PipelineLink::Previous, 2), Ok(1));
        assert_eq!(p.resolve(PipelineLink::Last, 0), Ok(2));
        assert!(p.resolve(PipelineLink::Previous, 0).is_err());
        assert_eq!(p.stage_at(p.resolve(PipelineLink::First, 2).expect("index")), Ok(Handle::new(0)));
    }
}
