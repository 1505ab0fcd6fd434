use anyhow::Context;
use apache_avro::types::Value;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use stream_uplink::sender::TopicSenderExt;
use stream_uplink::{BatchedSender, Config, RestSender, Sender, SensorTopic};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const KEY_SCHEMA: &str = r#"{
    "type": "record", "name": "ObservationKey", "fields": [
        {"name": "userId", "type": "string"},
        {"name": "sourceId", "type": "string"}
    ]
}"#;

const VALUE_SCHEMA: &str = r#"{
    "type": "record", "name": "LightReading", "fields": [
        {"name": "time", "type": "double"},
        {"name": "timeReceived", "type": "double"},
        {"name": "light", "type": "float"}
    ]
}"#;

#[derive(Parser, Debug)]
#[command(name = "mock_producer")]
#[command(about = "Generate mock sensor records and upload them", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    #[arg(short = 'n', long, default_value_t = 100, help = "Number of records to send")]
    records: usize,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;
    info!(
        server = %config.server.base_url(),
        max_batch_size = config.batching.max_batch_size,
        "configuration loaded"
    );

    let topic = SensorTopic::parse("mock_light", KEY_SCHEMA, VALUE_SCHEMA)?;
    let rest = RestSender::new(&config.server, &config.registry, config.auth.as_ref())?;
    let sender = BatchedSender::new(rest, &config.batching);

    let mut topic_sender = sender.topic_sender(topic.topic())?;
    let key = Value::Record(vec![
        ("userId".into(), Value::String("mock-user".into())),
        ("sourceId".into(), Value::String("mock-source".into())),
    ]);

    let pairs = (0..args.records).map(|i| {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let value = Value::Record(vec![
            ("time".into(), Value::Double(now)),
            ("timeReceived".into(), Value::Double(now)),
            ("light".into(), Value::Float((i % 100) as f32 / 100.0)),
        ]);
        (key.clone(), value)
    });
    topic_sender.send_all(pairs)?;
    topic_sender.close()?;

    info!(records = args.records, "upload complete");
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("stream_uplink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("stream_uplink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
