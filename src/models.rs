pub mod category;
pub mod store;
pub mod task;
pub mod timer;
