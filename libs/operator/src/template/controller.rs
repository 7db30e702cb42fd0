//! Namespace-scoped `AIMServiceTemplate` controller entrypoint.

use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::{controller::Controller, watcher::Config};
use tracing::{error, info, trace};

use crate::controller::State;
use crate::crd::AIMServiceTemplate;

use super::reconcile::{error_policy, reconcile};

/// Starts the `AIMServiceTemplate` controller loop. Runs until the process
/// receives a shutdown signal.
pub async fn run(state: State, client: Client) {
    let templates = Api::<AIMServiceTemplate>::all(client.clone());
    if let Err(e) = templates.list(&ListParams::default().limit(1)).await {
        error!("AIMServiceTemplate CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        std::process::exit(1);
    }
    trace!("init AIMServiceTemplate controller");
    Controller::new(templates, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.to_context(client))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
