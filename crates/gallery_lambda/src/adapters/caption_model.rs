use std::future::Future;

/// Sends an already encoded request body to the hosted model and returns the raw reply.
pub trait CaptionModel {
    fn invoke_model(&self, body: Vec<u8>) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}
