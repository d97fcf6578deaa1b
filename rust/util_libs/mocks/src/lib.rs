pub mod nats_message;
pub mod request_stub;
pub mod test_nats_server;
