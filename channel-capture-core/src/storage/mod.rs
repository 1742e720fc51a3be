pub mod file_writer;
pub mod socket_forwarder;
pub mod symbol_export;
