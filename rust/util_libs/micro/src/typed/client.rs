use crate::client::{Client, ServiceError};
use crate::typed::address::Parameters;
use crate::typed::adapter::Schema;
use crate::typed::operation::OperationSpec;
use async_nats::HeaderMap;
use bytes::Bytes;
use std::time::Duration;

/// An encoded request ready to be sent to a typed operation.
pub struct RequestToSend<R, E> {
    pub subject: String,
    pub payload: Bytes,
    response: Schema<R>,
    error: Schema<E>,
}

impl<P: Parameters, T, R, E> OperationSpec<P, T, R, E> {
    /// Build a request for this operation: the subject is rendered from
    /// the address template and the payload encoded through the request
    /// schema.
    pub fn request_to_send(&self, params: &P, payload: &T) -> Result<RequestToSend<R, E>, anyhow::Error> {
        Ok(RequestToSend {
            subject: self.address.subject_for(params)?,
            payload: self.request.encode(payload)?,
            response: self.response.clone(),
            error: self.error.clone(),
        })
    }
}

/// The outcome of a typed request.
#[derive(Debug)]
pub enum Reply<R, E> {
    Ok {
        data: R,
        headers: HeaderMap,
    },
    Err {
        code: u16,
        description: String,
        data: Option<E>,
    },
}

/// Client-side counterpart of the typed operation layer.
#[derive(Clone, Debug)]
pub struct TypedClient {
    client: Client,
}

impl TypedClient {
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client: Client::new(client),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Send a typed request and decode the reply.
    ///
    /// A structured service error is decoded through the error schema
    /// and returned as [Reply::Err]; transport failures are returned as
    /// errors.
    pub async fn send<R, E>(
        &self,
        request: RequestToSend<R, E>,
        timeout: Option<Duration>,
    ) -> Result<Reply<R, E>, async_nats::Error> {
        match self
            .client
            .request(&request.subject, request.payload, None, timeout)
            .await
        {
            Ok(message) => {
                let data = request
                    .response
                    .decode(&message.payload)
                    .map_err(|err| Box::new(err) as async_nats::Error)?;
                Ok(Reply::Ok {
                    data,
                    headers: message.headers.unwrap_or_default(),
                })
            }
            Err(err) => match err.downcast::<ServiceError>() {
                Ok(service_error) => {
                    let data = if service_error.data.is_empty() {
                        None
                    } else {
                        request.error.decode(&service_error.data).ok()
                    };
                    Ok(Reply::Err {
                        code: service_error.code,
                        description: service_error.description,
                        data,
                    })
                }
                Err(other) => Err(other),
            },
        }
    }
}
