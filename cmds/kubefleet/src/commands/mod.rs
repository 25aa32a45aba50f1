pub mod capabilities;
pub mod clusters;
pub mod deploy;
pub mod drift;
pub mod find;
pub mod output;
pub mod sync;

pub mod util;
