//! RV32IM backend: register tables, frame layout, assembly emission.

pub mod emit;
pub mod frame;
pub mod regs;

pub use emit::generate;
pub use frame::FrameLayout;
