pub mod create;
pub mod reap;
pub mod routes;
pub mod serve;
pub mod session;
