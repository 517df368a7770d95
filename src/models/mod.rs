pub mod automation;
pub mod interview;
pub mod posting;
pub mod task;
