//! Volbrick - streamed volume brick octree with GPU min/max pyramids

pub mod core;
pub mod math;
pub mod volume;
pub mod gpu;
pub mod storage;
pub mod octree;
