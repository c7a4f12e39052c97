/// State management module
///
/// This module handles all slideshow state, including:
/// - Image set directories, playlists and refresh scheduling (image_set.rs)
/// - The running show: current set, auto/manual mode, controls (show.rs)

pub mod image_set;
pub mod show;
