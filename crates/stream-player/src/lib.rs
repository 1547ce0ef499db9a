pub mod codec;
pub mod config;
pub mod controller;
pub mod decode;
pub mod device;
pub mod events;
pub mod fetch;
pub mod net;
pub mod playback;
pub mod ring_buffer;
pub mod status;
mod task;
pub mod wav;
