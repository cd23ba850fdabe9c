pub mod frames;
pub mod fs;
pub mod jvm;
pub mod kcls;
