//! FFmpeg toolchain wrappers: command building, scene composition,
//! segment concatenation, export, probing, and filesystem helpers.

pub mod assemble;
pub mod command;
pub mod compose;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use assemble::FfmpegAssembler;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::FfmpegSceneRenderer;
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
