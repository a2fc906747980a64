use aws_config::BehaviorVersion;
use aws_lambda_events::event::s3::S3Event;
use gallery_lambda::adapters::aws::{BedrockCaptionModel, DynamoMetadataSink, S3ObjectSource};
use gallery_lambda::handlers::caption::{function_handler, CaptionHandlerConfig};
use lambda_runtime::{run, service_fn, tracing, Error, LambdaEvent};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::subscriber::fmt()
        .json()
        .with_target(false)
        // CloudWatch adds the ingestion time.
        .without_time()
        .init();

    let config = CaptionHandlerConfig::from_env().map_err(|error| Error::from(error.message()))?;
    tracing::info!(
        table = %config.table_name,
        model_id = %config.model_id,
        "Caption function starting"
    );

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let source = S3ObjectSource::new(aws_sdk_s3::Client::new(&aws_config));
    let model = BedrockCaptionModel::new(
        aws_sdk_bedrockruntime::Client::new(&aws_config),
        config.model_id.clone(),
    );
    let sink = DynamoMetadataSink::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.table_name.clone(),
    );

    run(service_fn(|event: LambdaEvent<S3Event>| {
        function_handler(event, &config, &source, &model, &sink)
    }))
    .await
}
