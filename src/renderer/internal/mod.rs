//! `Renderer` behaviour that runs outside of stage execution: the
//! once-per-frame invalidation flush and deferred lighting-stage injection.

mod flush;
mod lighting;
