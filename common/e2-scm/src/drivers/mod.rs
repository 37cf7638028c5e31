pub mod cvs;
pub mod files;
pub mod git;
pub mod licence;
pub mod svn;

pub use cvs::CvsDriver;
pub use files::{FilesDriver, FilesEntry};
pub use git::GitDriver;
pub use licence::{LicenceDriver, LicenceTextEntry};
pub use svn::SvnDriver;
