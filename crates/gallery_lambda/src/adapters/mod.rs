pub mod aws;
pub mod caption_model;
pub mod metadata_sink;
pub mod object_source;
