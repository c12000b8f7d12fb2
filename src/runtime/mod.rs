pub mod host;
pub mod runtime_error;
pub mod serialize;
pub mod value;
pub mod vm;

pub use host::{DeployedContract, Host, MemoryHost, TRIGGER_APPLICATION, TRIGGER_VERIFICATION};
pub use runtime_error::RuntimeError;
pub use value::StackItem;
pub use vm::{Vm, VmConfig};
