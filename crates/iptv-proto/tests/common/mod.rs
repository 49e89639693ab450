pub mod catalog_server;
pub mod fixtures;
pub mod mock_transport;
