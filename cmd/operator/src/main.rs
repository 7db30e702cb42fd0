use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use aim_k8s_util::client::new_client_with_metrics;
use aim_operator::controller::{OperatorConfig, State};
use aim_operator::discovery::concurrency;
use aim_operator::telemetry;
use aim_operator::template::{cluster_controller, controller};

use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config;
use prometheus_client::registry::Registry;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics())
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name = "aim-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,aim_operator=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Maximum number of discovery jobs allowed to run concurrently across
    /// the whole cluster.
    #[arg(long, default_value_t = 4, env)]
    max_discovery_concurrency: usize,

    /// Namespace discovery jobs for cluster-scoped templates are created
    /// in, since `AIMClusterServiceTemplate` has no namespace of its own.
    #[arg(long, default_value = "aim-system", env)]
    discovery_job_namespace: String,

    /// Interval between reconciles of an otherwise-unchanged template.
    #[arg(long, default_value_t = 30, env)]
    requeue_after_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("aim_operator");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;

    let operator_config = OperatorConfig {
        max_discovery_concurrency: args.max_discovery_concurrency,
        requeue_after_secs: args.requeue_after_secs,
        discovery_job_namespace: args.discovery_job_namespace,
    };
    let state = State::new(operator_config, registry);

    if let Err(e) = concurrency::seed_from_cluster(&client, args.max_discovery_concurrency).await {
        tracing::warn!("failed to seed discovery concurrency state from cluster: {e:?}");
    }

    let namespaced = controller::run(state.clone(), client.clone());
    let cluster_scoped = cluster_controller::run(state.clone(), client);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // All three run until shutdown; poll until they're all done.
    tokio::join!(namespaced, cluster_scoped, server.run()).2?;
    Ok(())
}
