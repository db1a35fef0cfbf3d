//! Intermediate representation: decoded instructions, the control-flow
//! graph, dominator analysis, and structured-region recovery.

pub mod cfg;
pub mod dom;
pub mod instruction;
pub mod regions;

pub use cfg::{BasicBlock, BlockId, Cfg};
pub use dom::DomInfo;
pub use instruction::{Arg, ArgValue, Instruction};
pub use regions::Regions;
