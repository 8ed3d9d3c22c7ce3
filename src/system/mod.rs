pub mod cpu_time;
pub mod history;
pub mod kill;
pub mod procfs;
pub mod snapshot;
pub mod table;
pub mod tree;
