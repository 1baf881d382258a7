pub mod serve;
pub mod testdata;
pub mod watch;
