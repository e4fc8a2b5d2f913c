mod in_memory;
mod log;

pub use in_memory::InMemoryLog;
pub use log::opt_index_u64;
pub use log::Entry;
pub use log::Index;
pub use log::Log;
