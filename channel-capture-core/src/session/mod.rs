pub mod dispatcher;
pub mod driver;
