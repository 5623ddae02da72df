//! Assembly emission: the virtual stack model and the IR-to-assembly
//! scheduler.
pub mod asm;
pub mod ir_to_asm;
pub mod stack;

pub use asm::{AsmItem, format_assembly};
pub use ir_to_asm::generate_assembly;
pub use stack::StackModel;
