pub mod convert;
pub mod ffmpeg_utils;
pub mod permissions;
pub mod recording;
pub mod sources;
