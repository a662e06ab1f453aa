pub mod decoder;
pub mod frame;
pub mod info;
pub mod memory;
pub mod sampler;
