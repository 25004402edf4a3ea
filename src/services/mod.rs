//! Services module - the collaborators the scheduler drives.
//!
//! - [`ExistenceChecker`]: deterministic clip naming, re-run detection and clip discovery
//! - [`RenderUnit`]: the opaque "render one question" contract, with
//!   [`CommandRenderer`] running an external render program per question
//! - [`Concatenator`]: the "merge N clips" contract, with [`FfmpegConcatenator`]
//!   using the ffmpeg concat demuxer
//!
//! None of these know about batches, cooldowns or signals; that is the
//! scheduler's job.

pub mod concat;
pub mod existence;
pub mod render;

pub use concat::{CONCAT_LIST_NAME, ConcatError, Concatenator, FfmpegConcatenator};
pub use existence::{ExistenceChecker, RenderPlan, is_valid_clip};
pub use render::{CommandRenderer, RenderError, RenderUnit};
