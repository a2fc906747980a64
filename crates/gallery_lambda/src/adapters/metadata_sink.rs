use std::future::Future;

use gallery_core::contract::CaptionRecord;

pub trait MetadataSink {
    fn put_record(&self, record: &CaptionRecord)
        -> impl Future<Output = Result<(), String>> + Send;
}
