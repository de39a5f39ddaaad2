pub mod init;
pub mod permissions;
pub mod render;
pub mod site;
pub mod worker;
