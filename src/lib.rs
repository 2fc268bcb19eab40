pub mod config;
pub mod detector;
pub mod driver;
pub mod error;
pub mod feature;
pub mod frame;
pub mod image;
pub mod math;
pub mod my_types;
pub mod optical_flow;
pub mod pyramid;
pub mod track_writer;
pub mod tracker;
pub mod video;
