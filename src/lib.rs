pub mod backend_config;
pub mod frame_loop;
pub mod geometry_utils;
pub mod publisher;
pub mod systems;
pub mod tether_interface;
pub mod tracking;
