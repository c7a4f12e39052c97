/// User interface module
///
/// The slideshow has a single screen: the current slide, letterboxed on
/// black (slide.rs).

pub mod slide;

pub use slide::slide;
