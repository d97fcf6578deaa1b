pub mod adapter;
pub mod address;
pub mod client;
pub mod message;
pub mod operation;

pub use adapter::{Schema, SchemaError, TypeAdapter};
pub use address::{Address, AddressError, ParamValue, Parameters};
pub use client::{Reply, RequestToSend, TypedClient};
pub use message::TypedMessage;
pub use operation::{add_operation, ErrorMapper, Operation, OperationSpec};
