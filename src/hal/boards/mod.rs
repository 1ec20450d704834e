pub mod bladerf1;
pub mod bladerf2;
pub mod common;
pub mod regs;

pub use bladerf1::Bladerf1;
pub use bladerf2::Bladerf2;
