use std::future::Future;

pub trait ObjectSource {
    fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}
