/// Counters for one call of `Renderer::render_frame`, including the
/// invalidation flush that precedes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub stages_executed: u32,
    pub draw_calls: u32,
    pub resolves: u32,
    pub light_slot_uploads: u32,
    pub geometry_uploads: u32,
    pub bounding_volume_updates: u32,
    pub material_updates: u32,
}
