pub mod logs;
pub mod packages;
pub mod report;
pub mod script;
pub mod symbolicate;

pub use logs::*;
pub use packages::*;
pub use report::*;
pub use script::*;
pub use symbolicate::*;
