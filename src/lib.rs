// Library for tests to access modules

pub mod capture;
pub mod config;
pub mod error;
pub mod general_log;
pub mod histogram;
pub mod models;
pub mod mysql_admin;
pub mod output;
pub mod purge;
pub mod report;
pub mod sampler;
pub mod scan;
pub mod version;
pub mod watcher;
pub mod worker;
