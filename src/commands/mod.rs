pub mod claims;
pub mod init;
pub mod policy;
pub mod simulate;
