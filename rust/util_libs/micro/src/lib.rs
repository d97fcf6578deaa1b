pub mod client;
pub mod connect;
pub mod context;
pub mod group;
pub mod middleware;
pub mod models;
pub mod request;
pub mod request_many;
pub mod service;
pub mod subject;
pub mod typed;
pub mod types;

pub use client::{Client, DiscoverOpts, InstanceClient, ServiceClient, ServiceError};
pub use connect::{connect, ClientEvent, ConnectArgs, Credentials, NatsConnection};
pub use context::{run, Context};
pub use group::Group;
pub use middleware::{apply_middlewares, Middleware, Response};
pub use request::{NatsRequest, Request};
pub use request_many::RequestMany;
pub use service::{add_service, Endpoint, Service};
pub use subject::{ServiceVerb, API_PREFIX, DEFAULT_QUEUE_GROUP};
pub use types::{
    AsyncEndpointHandler, ConfigError, EndpointBuilder, GroupBuilder, ServiceBuilder,
};

#[cfg(test)]
mod tests;
