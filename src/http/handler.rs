use crate::http::request::Request;
use crate::http::response::Response;

/// The application callback.
///
/// Called once per parsed request, synchronously, while the connection is in
/// its dispatching state. The request is only borrowed for the call. An `Err`
/// becomes a generic 500; its text is logged but never sent to the client.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> anyhow::Result<Response>;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    fn handle(&self, request: &Request) -> anyhow::Result<Response> {
        self(request)
    }
}
